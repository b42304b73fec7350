pub mod db;
pub mod error;
pub mod http;
pub mod mailer;
pub mod telemetry;
