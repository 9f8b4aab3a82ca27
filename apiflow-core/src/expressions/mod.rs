pub mod capture;
pub mod condition;
pub mod generators;
pub mod path;
pub mod template;

pub use capture::{capture, extract, CaptureMiss, CaptureOutcome, CaptureSource};
pub use condition::{evaluate_condition, is_truthy};
pub use generators::generate;
pub use path::{is_singular_path, normalize_path, query_path, PathError, PathMatch};
pub use template::{contains_placeholder, extract_expressions, parse_template, Segment, Template};
