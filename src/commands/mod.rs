mod locate;

pub use locate::{OutputFormat, locate};
