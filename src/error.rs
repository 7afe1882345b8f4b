use serde::ser::Serializer;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("unknown asset: {0}")]
    UnknownAsset(String),
    #[error("duplicate asset id: {0}")]
    DuplicateAsset(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("request error: {0}")]
    Reqwest(#[from] reqwest::Error),
    #[error("websocket error: {0}")]
    WebSocket(Box<tokio_tungstenite::tungstenite::Error>),
    #[error("json decode error: {0}")]
    SimdJson(#[from] simd_json::Error),
    #[error("float parse error: {0}")]
    ParseFloat(#[from] std::num::ParseFloatError),
    #[error("fallback fetch failed (direct: {direct}; proxy: {proxy})")]
    FallbackExhausted { direct: String, proxy: String },
}

impl From<tokio_tungstenite::tungstenite::Error> for AppError {
    fn from(value: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::WebSocket(Box::new(value))
    }
}

impl serde::Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_as_display_string() {
        let error = AppError::UnknownAsset("xagusd".to_string());
        let encoded = simd_json::to_string(&error).expect("error should serialize");
        assert_eq!(encoded, "\"unknown asset: xagusd\"");
    }

    #[test]
    fn fallback_exhausted_names_both_paths() {
        let error = AppError::FallbackExhausted {
            direct: "timed out".to_string(),
            proxy: "502 Bad Gateway".to_string(),
        };
        let message = error.to_string();
        assert!(message.contains("direct: timed out"));
        assert!(message.contains("proxy: 502 Bad Gateway"));
    }
}
