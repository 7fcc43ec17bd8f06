//! `ETag`/`If-None-Match` revalidation, independent of `Cache-Control`
//! freshness — always attempted when a cached `NONE`-subtype record carries
//! an `ETag`, so a stale-by-date entry still gets a cheap 304 round trip.

use std::{collections::HashMap, time::SystemTime};

use crate::{
    error::Result,
    headers::HeaderMap,
    pipeline::{RequestParts, ResponseParts},
    subtype::Subtype,
};

use super::{Handler, HandlerId, Verdict};

/// Attaches `If-None-Match` on requests and classifies `304`/fresh-`ETag`
/// responses.
#[derive(Debug, Clone, Default)]
pub struct EtagValidator;

impl Handler for EtagValidator {
    fn id(&self) -> HandlerId {
        HandlerId::EtagValidator
    }

    fn handle_request(
        &self,
        req: &mut dyn RequestParts,
        subtypes: Option<&HashMap<Subtype, HeaderMap>>,
        _now: SystemTime,
    ) -> Result<Option<Verdict>> {
        let Some(subtypes) = subtypes else { return Ok(None) };
        let Some(cached) = subtypes.get(&Subtype::None) else { return Ok(None) };
        let Some(etag) = cached.get("etag").map(str::to_string) else {
            return Ok(None);
        };
        req.headers_mut().insert("If-None-Match", etag);
        Ok(Some(Verdict::Request))
    }

    fn handle_response(
        &self,
        resp: &dyn ResponseParts,
        _now: SystemTime,
    ) -> Result<Option<Verdict>> {
        if resp.status_code() == 304 {
            return Ok(Some(Verdict::Fetch {
                url: resp.url().to_string(),
                subtype: Subtype::None,
            }));
        }
        if resp.status_code() < 300 && resp.headers().contains("etag") {
            return Ok(Some(Verdict::Store {
                url: resp.url().to_string(),
                subtype: Subtype::None,
            }));
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeRequest {
        headers: HeaderMap,
    }

    impl RequestParts for FakeRequest {
        fn full_url(&self) -> &str {
            "http://x/a"
        }
        fn method(&self) -> &str {
            "GET"
        }
        fn headers(&self) -> &HeaderMap {
            &self.headers
        }
        fn headers_mut(&mut self) -> &mut HeaderMap {
            &mut self.headers
        }
        fn config(&self) -> &crate::pipeline::RequestConfig {
            unimplemented!()
        }
    }

    struct FakeResponse {
        status: u16,
        headers: HeaderMap,
    }

    impl ResponseParts for FakeResponse {
        fn url(&self) -> &str {
            "http://x/a"
        }
        fn status_code(&self) -> u16 {
            self.status
        }
        fn headers(&self) -> &HeaderMap {
            &self.headers
        }
        fn headers_mut(&mut self) -> &mut HeaderMap {
            &mut self.headers
        }
        fn request_method(&self) -> &str {
            "GET"
        }
        fn request_headers(&self) -> &HeaderMap {
            &self.headers
        }
    }

    #[test]
    fn attaches_if_none_match_when_etag_cached() {
        let mut cached = HeaderMap::new();
        cached.insert("etag", "\"v1\"");
        let mut subtypes = HashMap::new();
        subtypes.insert(Subtype::None, cached);

        let mut req = FakeRequest { headers: HeaderMap::new() };
        let verdict =
            EtagValidator.handle_request(&mut req, Some(&subtypes), SystemTime::now()).unwrap();
        assert_eq!(verdict, Some(Verdict::Request));
        assert_eq!(req.headers.get("If-None-Match"), Some("\"v1\""));
    }

    #[test]
    fn no_etag_on_cached_entry_is_unhandled() {
        let subtypes = HashMap::from([(Subtype::None, HeaderMap::new())]);
        let mut req = FakeRequest { headers: HeaderMap::new() };
        assert_eq!(
            EtagValidator.handle_request(&mut req, Some(&subtypes), SystemTime::now()).unwrap(),
            None
        );
    }

    #[test]
    fn status_304_fetches_from_cache() {
        let resp = FakeResponse { status: 304, headers: HeaderMap::new() };
        assert_eq!(
            EtagValidator.handle_response(&resp, SystemTime::now()).unwrap(),
            Some(Verdict::Fetch { url: "http://x/a".into(), subtype: Subtype::None })
        );
    }

    #[test]
    fn success_with_etag_is_stored() {
        let mut headers = HeaderMap::new();
        headers.insert("etag", "\"v2\"");
        let resp = FakeResponse { status: 200, headers };
        assert_eq!(
            EtagValidator.handle_response(&resp, SystemTime::now()).unwrap(),
            Some(Verdict::Store { url: "http://x/a".into(), subtype: Subtype::None })
        );
    }

    #[test]
    fn success_without_etag_is_unhandled() {
        let resp = FakeResponse { status: 200, headers: HeaderMap::new() };
        assert_eq!(EtagValidator.handle_response(&resp, SystemTime::now()).unwrap(), None);
    }
}
