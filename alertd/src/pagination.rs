use crate::errors::{Error, Result};
use crate::model::Timeframe;
use crate::repo::PageCursor;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const TOKEN_VERSION: u8 = 1;

/// Query context a page token is bound to. A token is only valid when
/// replayed against the same device and timeframe that produced it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TokenContext<'a> {
    pub device_id: &'a str,
    pub timeframe: Timeframe,
}

/// Wire form of a page token before base64 encoding. The version byte
/// leaves headroom to change the schema without breaking issued tokens
/// silently.
#[derive(Debug, Serialize, Deserialize)]
struct TokenPayload {
    v: u8,
    device_id: String,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
    last_time: DateTime<Utc>,
    last_id: i64,
}

/// Serializes a cursor and its binding context into an opaque, URL-safe,
/// unpadded token.
pub fn encode_page_token(cursor: PageCursor, ctx: &TokenContext<'_>) -> Result<String> {
    let payload = TokenPayload {
        v: TOKEN_VERSION,
        device_id: ctx.device_id.to_string(),
        start: ctx.timeframe.start,
        end: ctx.timeframe.end,
        last_time: cursor.last_time,
        last_id: cursor.last_id,
    };
    let bytes = serde_json::to_vec(&payload)?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

/// Reverses [`encode_page_token`]. Malformed input and a context mismatch
/// are both rejected as [`Error::InvalidPageToken`].
pub fn decode_page_token(token: &str, expected: &TokenContext<'_>) -> Result<PageCursor> {
    let bytes = URL_SAFE_NO_PAD
        .decode(token)
        .map_err(|_| Error::InvalidPageToken)?;
    let payload: TokenPayload =
        serde_json::from_slice(&bytes).map_err(|_| Error::InvalidPageToken)?;

    if payload.v != TOKEN_VERSION {
        return Err(Error::InvalidPageToken);
    }
    if payload.device_id != expected.device_id
        || payload.start != expected.timeframe.start
        || payload.end != expected.timeframe.end
    {
        return Err(Error::InvalidPageToken);
    }

    Ok(PageCursor {
        last_time: payload.last_time,
        last_id: payload.last_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn cursor() -> PageCursor {
        PageCursor {
            last_time: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            last_id: 42,
        }
    }

    fn timeframe() -> Timeframe {
        Timeframe {
            start: Some(Utc.timestamp_opt(1_600_000_000, 0).unwrap()),
            end: Some(Utc.timestamp_opt(1_800_000_000, 0).unwrap()),
        }
    }

    #[test]
    fn test_round_trip() {
        let ctx = TokenContext {
            device_id: "d3",
            timeframe: timeframe(),
        };
        let token = encode_page_token(cursor(), &ctx).unwrap();
        let decoded = decode_page_token(&token, &ctx).unwrap();
        assert_eq!(decoded, cursor());
    }

    #[test]
    fn test_round_trip_unbounded_timeframe() {
        let ctx = TokenContext {
            device_id: "d3",
            timeframe: Timeframe::default(),
        };
        let token = encode_page_token(cursor(), &ctx).unwrap();
        assert_eq!(decode_page_token(&token, &ctx).unwrap(), cursor());
    }

    #[test]
    fn test_token_is_url_safe() {
        let ctx = TokenContext {
            device_id: "d3",
            timeframe: timeframe(),
        };
        let token = encode_page_token(cursor(), &ctx).unwrap();
        assert!(token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn test_rejects_different_device() {
        let issued = TokenContext {
            device_id: "d3",
            timeframe: timeframe(),
        };
        let replayed = TokenContext {
            device_id: "d4",
            timeframe: timeframe(),
        };
        let token = encode_page_token(cursor(), &issued).unwrap();
        assert!(matches!(
            decode_page_token(&token, &replayed),
            Err(Error::InvalidPageToken)
        ));
    }

    #[test]
    fn test_rejects_different_timeframe() {
        let issued = TokenContext {
            device_id: "d3",
            timeframe: timeframe(),
        };
        let replayed = TokenContext {
            device_id: "d3",
            timeframe: Timeframe {
                start: timeframe().start,
                end: None,
            },
        };
        let token = encode_page_token(cursor(), &issued).unwrap();
        assert!(matches!(
            decode_page_token(&token, &replayed),
            Err(Error::InvalidPageToken)
        ));
    }

    #[test]
    fn test_rejects_malformed_token() {
        let ctx = TokenContext {
            device_id: "d3",
            timeframe: timeframe(),
        };
        assert!(matches!(
            decode_page_token("not base64!!!", &ctx),
            Err(Error::InvalidPageToken)
        ));
        // valid base64, garbage payload
        let garbage = URL_SAFE_NO_PAD.encode(b"{\"nope\":true}");
        assert!(matches!(
            decode_page_token(&garbage, &ctx),
            Err(Error::InvalidPageToken)
        ));
    }

    #[test]
    fn test_rejects_unknown_version() {
        let ctx = TokenContext {
            device_id: "d3",
            timeframe: Timeframe::default(),
        };
        let payload = TokenPayload {
            v: TOKEN_VERSION + 1,
            device_id: "d3".to_string(),
            start: None,
            end: None,
            last_time: cursor().last_time,
            last_id: cursor().last_id,
        };
        let token = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&payload).unwrap());
        assert!(matches!(
            decode_page_token(&token, &ctx),
            Err(Error::InvalidPageToken)
        ));
    }
}
