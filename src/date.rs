//! `Date` header formatting (IMF-fixdate, `spec.md` §6).

#[cfg(feature = "date_header")]
pub fn now_imf_fixdate() -> String {
    use std::time::SystemTime;
    httpdate::fmt_http_date(SystemTime::now())
}

#[cfg(not(feature = "date_header"))]
pub fn now_imf_fixdate() -> String {
    String::new()
}
