mod url_override;
mod use_app;

pub use url_override::UrlOverride;
pub use use_app::UseApp;
