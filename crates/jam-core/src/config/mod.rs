//! Configuration for jam-core hosts
//!
//! - [`EngineConfig`]: engine tuning (track capacity, capture queue, monitoring)
//!   plus the audio device selection
//! - Generic YAML config loading/saving
//! - Platform config path utilities
//!
//! # Usage
//!
//! ```ignore
//! use jam_core::config::{default_config_path, load_config, save_config, EngineConfig};
//!
//! let path = default_config_path("engine.yaml");
//! let config: EngineConfig = load_config(&path);
//! save_config(&config, &path)?;
//! ```

mod engine;
mod io;
mod paths;

pub use engine::EngineConfig;
pub use io::{load_config, save_config};
pub use paths::{default_config_dir, default_config_path};
