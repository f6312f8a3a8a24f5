use crate::traces::propagation::header_encoder::try_decode_base64_to_string;

/// Result of an outbound payload request.
///
/// `Empty` is returned whenever no payload should be sent; it is always safe
/// to call [`http_safe`](Self::http_safe) on it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum DistributedTraceApiModel {
    #[default]
    Empty,
    Encoded(String),
}

impl DistributedTraceApiModel {
    /// The base64 header value, or `""` for the empty model.
    #[must_use]
    pub fn http_safe(&self) -> &str {
        match self {
            DistributedTraceApiModel::Empty => "",
            DistributedTraceApiModel::Encoded(encoded) => encoded,
        }
    }

    /// The payload JSON, or `""` for the empty model.
    #[must_use]
    pub fn text(&self) -> String {
        match self {
            DistributedTraceApiModel::Empty => String::new(),
            DistributedTraceApiModel::Encoded(encoded) => {
                try_decode_base64_to_string(encoded).unwrap_or_default()
            }
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self, DistributedTraceApiModel::Empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traces::propagation::header_encoder::encode_base64;

    #[test]
    fn empty_model_is_safe_to_use() {
        let model = DistributedTraceApiModel::default();
        assert!(model.is_empty());
        assert_eq!(model.http_safe(), "");
        assert_eq!(model.text(), "");
    }

    #[test]
    fn encoded_model_exposes_header_and_text() {
        let model = DistributedTraceApiModel::Encoded(encode_base64(r#"{"v":[0,1]}"#));
        assert!(!model.is_empty());
        assert_eq!(model.http_safe(), "eyJ2IjpbMCwxXX0=");
        assert_eq!(model.text(), r#"{"v":[0,1]}"#);
    }
}
