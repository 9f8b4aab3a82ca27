pub(crate) mod component;
pub(crate) mod step;
pub(crate) mod workflow;
