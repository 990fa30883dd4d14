use garde::Validate;
use serde::{Deserialize, Serialize};

/// Request accepted by `POST /api/v1/style`.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct StyleBatchRequest {
    /// Base64-encoded JPEG photos, in capture order.
    #[garde(length(min = 1, max = 16), inner(length(min = 1)))]
    pub photos: Vec<String>,

    /// Style preset name; must parse against the registry.
    #[garde(length(min = 1, max = 64))]
    pub style: String,
}

/// Response envelope. There is no partial-success shape: either every photo
/// styled and `styled_photo_urls` is full-length, or it is empty and `error`
/// says why.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StyleBatchResponse {
    pub styled_photo_urls: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StyleBatchResponse {
    pub fn ok(styled_photo_urls: Vec<String>) -> Self {
        Self {
            styled_photo_urls,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            styled_photo_urls: Vec::new(),
            error: Some(error.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_uses_camel_case_on_the_wire() {
        let json = serde_json::to_string(&StyleBatchResponse::ok(vec!["u".into()])).unwrap();
        assert!(json.contains("styledPhotoUrls"));
        assert!(!json.contains("error"));
    }

    #[test]
    fn test_failed_response_has_empty_urls() {
        let resp = StyleBatchResponse::failed("no quota");
        assert!(resp.styled_photo_urls.is_empty());
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains(r#""error":"no quota""#));
    }

    #[test]
    fn test_request_roundtrip() {
        let req: StyleBatchRequest =
            serde_json::from_str(r#"{"photos":["aGVsbG8="],"style":"vintage"}"#).unwrap();
        assert_eq!(req.photos.len(), 1);
        assert_eq!(req.style, "vintage");
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_empty_batch_fails_validation() {
        let req = StyleBatchRequest {
            photos: vec![],
            style: "vintage".to_string(),
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_blank_photo_fails_validation() {
        let req = StyleBatchRequest {
            photos: vec![String::new()],
            style: "vintage".to_string(),
        };
        assert!(req.validate().is_err());
    }
}
