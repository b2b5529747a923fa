pub mod context;
pub mod encoding;
pub mod features;
pub mod forecast;
pub mod model;
pub mod types;
pub mod window;
