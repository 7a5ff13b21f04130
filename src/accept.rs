//! `Accept`/`Accept-Language`/`Accept-Encoding` parsing with `q=` weights.
//!
//! Grounded on the original's `MultiValuePreference`
//! (`examples/original_source/oahttp/http_util.py`). Scoring beyond `q=`
//! parsing (wildcards, structured suffix matching) is a Non-goal per
//! `spec.md` §1; we implement exactly the `q=` precedence the router's
//! `ContentTypeDispatcher` needs (`spec.md` §4.E).

/// One entry of an `Accept`-family header: a token plus its `q=` weight
/// (defaulting to `1.0`), in header order.
#[derive(Debug, Clone)]
pub struct Preference {
    entries: Vec<(String, f32)>,
}

impl Preference {
    pub fn parse(value: Option<&[u8]>) -> Preference {
        let Some(value) = value else {
            return Preference { entries: Vec::new() };
        };
        let text = String::from_utf8_lossy(value);
        let mut entries = Vec::new();
        for item in text.split(',') {
            let item = item.trim();
            if item.is_empty() {
                continue;
            }
            let mut parts = item.split(';');
            let token = parts.next().unwrap_or("").trim().to_string();
            let mut q = 1.0f32;
            for param in parts {
                let param = param.trim();
                if let Some(rest) = param.strip_prefix("q=") {
                    if let Ok(parsed) = rest.trim().parse::<f32>() {
                        q = parsed;
                    }
                }
            }
            entries.push((token, q));
        }
        Preference { entries }
    }

    /// Returns the `q=` weight for an exact token match, `1.0` if the
    /// header was absent (meaning "anything is acceptable"), or `None` if
    /// present but this token isn't listed (including `q=0`, an explicit
    /// rejection per RFC 9110 §12.5.1).
    pub fn acceptable(&self, token: &str) -> Option<f32> {
        if self.entries.is_empty() {
            return Some(1.0);
        }
        for (candidate, q) in &self.entries {
            if candidate == token || candidate == "*" || candidate == "*/*" {
                return if *q > 0.0 { Some(*q) } else { None };
            }
        }
        None
    }
}

#[cfg(test)]
mod test {
    use super::Preference;

    #[test]
    fn empty_header_accepts_anything() {
        let p = Preference::parse(None);
        assert_eq!(p.acceptable("application/json"), Some(1.0));
    }

    #[test]
    fn picks_highest_q() {
        let p = Preference::parse(Some(b"text/html;q=0.5, application/json;q=0.9"));
        assert_eq!(p.acceptable("application/json"), Some(0.9));
        assert_eq!(p.acceptable("text/html"), Some(0.5));
        assert_eq!(p.acceptable("text/plain"), None);
    }

    #[test]
    fn zero_q_rejects() {
        let p = Preference::parse(Some(b"application/json;q=0"));
        assert_eq!(p.acceptable("application/json"), None);
    }

    #[test]
    fn wildcard_matches() {
        let p = Preference::parse(Some(b"*/*;q=0.2"));
        assert_eq!(p.acceptable("anything/here"), Some(0.2));
    }
}
