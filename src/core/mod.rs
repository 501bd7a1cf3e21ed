pub mod etl;
pub mod parser;
pub mod pipeline;
pub mod placeholder;
pub mod sheet_name;
pub mod timezone;

pub use crate::domain::model::{QuerySet, Workbook};
pub use crate::domain::ports::{ConfigProvider, Database, Pipeline, Storage, WorkbookWriter};
pub use crate::utils::error::Result;
