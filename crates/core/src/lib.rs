pub mod model;
pub mod parsers;
pub mod session;
pub mod views;

pub use model::{CallTree, CallTreeSource, FunctionId, NodeKey};
pub use parsers::collapsed::{CollapsedParseError, parse_collapsed};
pub use session::{CallTreeView, ViewError, ViewMode};
pub use views::{SearchResults, ViewNode, ViewNodeId, ViewTree};
