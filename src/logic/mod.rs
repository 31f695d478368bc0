pub mod bgprocess;
pub mod calendar;
pub mod context;
pub mod dependency;
pub mod directory_compare;
pub mod function_args;
pub mod node;
pub mod privileges;
pub mod registry;
pub mod schema_diff;
pub mod view;

pub use bgprocess::{BackgroundJobs, JobCommand, JobRecord, JobStatus};
pub use context::{precondition, BrowserSettings, NodeContext};
pub use directory_compare::{compare_dictionaries, directory_diff, CompareOptions};
pub use node::{CustomOperation, HttpMethod, NodeDef, ParentLevel, Scope, TemplateLayout, Verb};
pub use registry::{dispatch, NodeRegistry};
pub use schema_diff::DiffSessions;
pub use view::NodeView;
