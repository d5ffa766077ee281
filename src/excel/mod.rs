//! Workbook render/ingest engine: `writer` turns a `ReportBook` into a
//! formatted `.xlsx`, `reader` turns a vendor drop worksheet into a `Frame`.

pub mod reader;
pub mod writer;
