pub mod row;
pub mod settings;
pub mod shared_str;

pub use row::{RowKind, TextSpan, ViewRow};
pub use settings::{CallTreeSettings, SettingsError};
pub use shared_str::SharedStr;
