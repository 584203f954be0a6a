pub use anyhow::{anyhow, bail, ensure, Context};
#[cfg(feature = "logging")]
pub use log;
pub use ndarray::{array, Array, Array1, ArrayView1, Axis};
pub use serde::{Deserialize, Serialize};
pub use std::ffi::OsStr;
pub use std::fs::File;
pub use std::path::{Path, PathBuf};
pub use validator::{Validate, ValidationError, ValidationErrors};

pub use crate::error::SimError;
pub use crate::traits::*;
