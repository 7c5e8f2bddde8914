use reqwest::Url;

use super::{Connection, Mode, error::ProtocolError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    Read,
    Write,
}

impl Verb {
    pub fn as_str(self) -> &'static str {
        match self {
            Verb::Read => "Read",
            Verb::Write => "Write",
        }
    }
}

/// Everything needed to issue one GET, minus the credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestDescriptor {
    pub mode: Mode,
    pub base: String,
    pub path: &'static str,
    pub query: Vec<(&'static str, String)>,
}

/// `ids` are sent as-is; for writes pass `<id>;<value>`.
pub fn build_request(
    mode: Mode,
    conn: &Connection,
    verb: Verb,
    ids: &[&str],
) -> Result<RequestDescriptor, ProtocolError> {
    if ids.is_empty() {
        return Err(ProtocolError::NoIds);
    }
    if mode == Mode::Generic && ids.len() > 1 {
        return Err(ProtocolError::GenericBatch(ids.len()));
    }

    let mut query = Vec::with_capacity(ids.len() + 4);
    query.push(("FN", verb.as_str().to_string()));
    for id in ids {
        query.push((mode.param(), id.to_string()));
    }
    query.push(("LNG", "-1".to_string()));
    query.push(("US", "1".to_string()));
    if let Some(pin) = conn.pin() {
        query.push(("PIN", pin.to_string()));
    }

    Ok(RequestDescriptor {
        mode,
        base: conn.base_url(),
        path: mode.paths()[0],
        query,
    })
}

impl RequestDescriptor {
    pub fn url(&self) -> Result<Url, ProtocolError> {
        let raw = format!("{}{}", self.base, self.path);
        Url::parse_with_params(&raw, &self.query).map_err(|_| ProtocolError::Url(raw))
    }

    /// Next firmware spelling of the endpoint path, if any.
    pub fn alternate(&self) -> Option<Self> {
        let paths = self.mode.paths();
        let pos = paths.iter().position(|p| *p == self.path)?;
        paths.get(pos + 1).map(|path| Self {
            path: *path,
            ..self.clone()
        })
    }
}

/// Plain decimal, no exponent, no trailing `.0`.
pub fn format_value(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        return format!("{}", value as i64);
    }
    let s = format!("{value:.6}");
    s.trim_end_matches('0').trim_end_matches('.').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn(pin: Option<&str>) -> Connection {
        Connection {
            pin: pin.map(str::to_string),
            ..Connection::new("10.0.0.5")
        }
    }

    #[test]
    fn test_direct_repeats_id() {
        let req = build_request(Mode::Direct, &conn(None), Verb::Read, &["AAA", "BBB"]).unwrap();
        assert_eq!(req.path, "/JSON.HTML");
        assert_eq!(req.query, vec![
            ("FN", "Read".to_string()),
            ("ID", "AAA".to_string()),
            ("ID", "BBB".to_string()),
            ("LNG", "-1".to_string()),
            ("US", "1".to_string()),
        ]);
    }

    #[test]
    fn test_pin_appended_last() {
        let req = build_request(Mode::Generic, &conn(Some("7659")), Verb::Read, &["IgABAAAAKAA="]).unwrap();
        assert_eq!(req.path, "/jsongen.html");
        assert_eq!(req.query.last(), Some(&("PIN", "7659".to_string())));
        assert_eq!(
            req.url().unwrap().as_str(),
            "http://10.0.0.5/jsongen.html?FN=Read&OA=IgABAAAAKAA%3D&LNG=-1&US=1&PIN=7659"
        );
    }

    #[test]
    fn test_empty_pin_omitted() {
        let req = build_request(Mode::Direct, &conn(Some("")), Verb::Read, &["AAA"]).unwrap();
        assert!(req.query.iter().all(|(k, _)| *k != "PIN"));
    }

    #[test]
    fn test_generic_rejects_batch() {
        assert!(matches!(
            build_request(Mode::Generic, &conn(None), Verb::Read, &["A", "B"]),
            Err(ProtocolError::GenericBatch(2))
        ));
        assert!(matches!(
            build_request(Mode::Direct, &conn(None), Verb::Read, &[]),
            Err(ProtocolError::NoIds)
        ));
    }

    #[test]
    fn test_alternate_path() {
        let req = build_request(Mode::Generic, &conn(None), Verb::Read, &["A"]).unwrap();
        let alt = req.alternate().unwrap();
        assert_eq!(alt.path, "/JSONgen.html");
        assert!(alt.alternate().is_none());

        let direct = build_request(Mode::Direct, &conn(None), Verb::Read, &["A"]).unwrap();
        assert!(direct.alternate().is_none());
    }

    #[test]
    fn test_format_value() {
        assert_eq!(format_value(1.0), "1");
        assert_eq!(format_value(21.5), "21.5");
        assert_eq!(format_value(-3.0), "-3");
        assert_eq!(format_value(0.1 + 0.2), "0.3");
        assert_eq!(format_value(45.25), "45.25");
    }
}
