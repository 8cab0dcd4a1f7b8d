/// Gateway paths mirroring the two SOAP operations.
pub mod endpoints {
    pub const LAST_TABLE_UPDATE: &str = "/lastTableUpdate";
    pub const GET_TABLE: &str = "/getTable";
}

/// SOAP 1.2 request content type.
pub const SOAP_CONTENT_TYPE: &str = "application/soap+xml; charset=utf-8";

/// SOAP action for both operations.
pub const DEFAULT_SOAP_ACTION: &str = "ProcessRequest";

pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Join a base URL and an endpoint path with exactly one slash.
pub fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}
