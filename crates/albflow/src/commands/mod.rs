pub mod delete;
pub mod provision;
pub mod status;
pub mod template;
pub mod validate;
