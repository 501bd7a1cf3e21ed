// Adapters layer: concrete implementations for external systems (database, files, spreadsheets, mail)

pub mod database;
pub mod mail;
pub mod storage;
pub mod workbook;
