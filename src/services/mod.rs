pub mod cvaas_client;
pub mod dashboard_metrics;
pub mod fortigate_log;
pub mod qr_render;
pub mod report_export;
pub mod ripestat_client;
pub mod webdriver;
