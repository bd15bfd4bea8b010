//! Capture-thread side of the engine

use std::sync::Arc;

use crate::audio::CaptureCallback;
use crate::hub::FanOutHub;
use crate::node::MonitorFeed;
use crate::types::{AudioFormat, Sample};

/// The capture callback: fans every input buffer out, then feeds the monitor
pub struct CaptureProcessor {
    hub: Arc<FanOutHub>,
    format: AudioFormat,
    monitor: Option<MonitorFeed>,
}

impl CaptureProcessor {
    pub fn new(hub: Arc<FanOutHub>, format: AudioFormat, monitor: Option<MonitorFeed>) -> Self {
        Self {
            hub,
            format,
            monitor,
        }
    }
}

impl CaptureCallback for CaptureProcessor {
    fn process(&mut self, input: &[Sample]) {
        // Consumer failures are contained by the hub
        self.hub.dispatch(self.format, input);

        if let Some(feed) = self.monitor.as_mut() {
            feed.push_interleaved(input, self.format.channels as usize);
        }
    }
}
