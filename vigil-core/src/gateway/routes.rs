//! Paths of the scan service's HTTP surface.

use vigil_model::ScanId;

pub const ROOT: &str = "/";
pub const HEALTH: &str = "/health";
pub const SCANS: &str = "/api/scans";
pub const START_SCAN: &str = "/api/scans/start";

/// `/api/scans/{id}` with the id percent-encoded.
pub fn scan(id: &ScanId) -> String {
    format!("{}/{}", SCANS, urlencoding::encode(id.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_path_escapes_the_id() {
        let id = ScanId::new("a b/c").unwrap();
        assert_eq!(scan(&id), "/api/scans/a%20b%2Fc");
    }
}
