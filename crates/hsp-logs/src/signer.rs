// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! HMAC request signing for the HSP logging service.

use base64::prelude::*;
use chrono::{DateTime, SecondsFormat, Utc};
use hmac::{Hmac, Mac};
use reqwest::header::{HeaderMap, HeaderValue, InvalidHeaderValue};
use sha2::Sha256;

pub const SIGNED_DATE_HEADER: &str = "SignedDate";
pub const SIGNATURE_HEADER: &str = "hsdp-api-signature";

const SIGNING_KEY_PREFIX: &str = "DHPWS";
const ALGORITHM: &str = "HmacSHA256";

#[derive(Clone)]
pub struct Signer {
    shared_key: String,
    shared_secret: String,
}

impl std::fmt::Debug for Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Signer({})", self.shared_key)
    }
}

impl Signer {
    pub fn new(shared_key: impl Into<String>, shared_secret: impl Into<String>) -> Self {
        Self {
            shared_key: shared_key.into(),
            shared_secret: shared_secret.into(),
        }
    }

    /// Headers authenticating a request sent now.
    pub fn headers(&self) -> Result<HeaderMap, InvalidHeaderValue> {
        self.headers_at(Utc::now())
    }

    pub fn headers_at(&self, now: DateTime<Utc>) -> Result<HeaderMap, InvalidHeaderValue> {
        let signed_date = now.to_rfc3339_opts(SecondsFormat::Millis, true);
        let authorization = format!(
            "{ALGORITHM};Credential:{};SignedHeaders:{SIGNED_DATE_HEADER};Signature:{}",
            self.shared_key,
            self.signature(&signed_date)
        );

        let mut headers = HeaderMap::new();
        headers.insert(SIGNED_DATE_HEADER, HeaderValue::from_str(&signed_date)?);
        headers.insert(SIGNATURE_HEADER, HeaderValue::from_str(&authorization)?);
        Ok(headers)
    }

    fn signature(&self, signed_date: &str) -> String {
        let key = format!("{SIGNING_KEY_PREFIX}{}", self.shared_secret);
        // HMAC accepts keys of any length, new_from_slice cannot fail here.
        let mut mac = match Hmac::<Sha256>::new_from_slice(key.as_bytes()) {
            Ok(mac) => mac,
            Err(_) => return String::new(),
        };
        mac.update(BASE64_STANDARD.encode(signed_date).as_bytes());
        BASE64_STANDARD.encode(mac.finalize().into_bytes())
    }
}
