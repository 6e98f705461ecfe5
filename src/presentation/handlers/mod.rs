mod analyze;
mod health;
mod resolve;

pub use analyze::{AnalyzeUrlRequest, ErrorResponse, analyze_upload_handler, analyze_url_handler};
pub use health::health_handler;
pub use resolve::resolve_handler;
