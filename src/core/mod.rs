pub mod backup;
pub mod dashboard;
pub mod diagnostics;
pub mod entries;
pub mod ledger;
pub mod report;
pub mod sheets;
pub mod workbook;

pub use crate::domain::ports::{ConfigProvider, Pipeline, Storage};
pub use crate::utils::error::Result;
