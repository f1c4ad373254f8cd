//! Command-line front end for `longread`.
//!
//! The binary reads a document from a file or URL, summarizes it with the
//! [`longread`] engine, and writes the summary to a file or stdout. This
//! library half holds the configuration layer so it can be tested on its
//! own:
//!
//! ```ignore
//! use longread_cli::config::{EnvConfig, FileConfig, Overrides, Settings};
//!
//! let file = FileConfig::discover(None, std::path::Path::new("."))?;
//! let settings = Settings::resolve(file, EnvConfig::from_env(), Overrides {
//!     level: "concise".into(),
//!     ..Default::default()
//! })?;
//! ```

pub mod config;

pub use config::{EnvConfig, FileConfig, Overrides, Settings};
