//! Placeholder substitution for response templates.
//!
//! Templates are arbitrary strings containing `{{token}}` placeholders. Each
//! occurrence of a recognized token is replaced by a freshly generated value;
//! unrecognized tokens are passed through untouched.
//!
//! ```
//! use mock_api_engine::template::expand;
//!
//! let out = expand(r#"{"id":"{{uuid}}","note":"{{not.a.token}}"}"#);
//! assert!(out.contains("{{not.a.token}}"));
//! assert!(!out.contains("{{uuid}}"));
//! ```

use crate::fake;
use chrono::{SecondsFormat, Utc};
use once_cell::sync::Lazy;
use rand::Rng;
use regex::{Captures, Regex};

static TOKEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{([A-Za-z][A-Za-z0-9_.]*)\}\}").expect("valid token regex"));

/// Any `{{...}}` span, recognized or not. Used when validating templates.
static ANY_PLACEHOLDER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{[^{}]*\}\}").expect("valid placeholder regex"));

/// Upper bound (exclusive) for `{{random.number}}`.
pub const RANDOM_NUMBER_MAX: u32 = 1000;

/// A recognized placeholder token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token {
    Uuid,
    Timestamp,
    Datetime,
    RandomNumber,
    RandomBoolean,
    Name,
    FirstName,
    LastName,
    Email,
    Avatar,
    Phone,
    Address,
    Company,
    LoremSentence,
    LoremParagraph,
    Image,
    Color,
    HexColor,
    Url,
    Username,
}

impl Token {
    /// Every recognized token.
    pub const ALL: [Token; 20] = [
        Token::Uuid,
        Token::Timestamp,
        Token::Datetime,
        Token::RandomNumber,
        Token::RandomBoolean,
        Token::Name,
        Token::FirstName,
        Token::LastName,
        Token::Email,
        Token::Avatar,
        Token::Phone,
        Token::Address,
        Token::Company,
        Token::LoremSentence,
        Token::LoremParagraph,
        Token::Image,
        Token::Color,
        Token::HexColor,
        Token::Url,
        Token::Username,
    ];

    /// Resolve the text between the braces to a token.
    pub fn from_name(name: &str) -> Option<Self> {
        let token = match name {
            "uuid" => Token::Uuid,
            "timestamp" => Token::Timestamp,
            "datetime" => Token::Datetime,
            "random.number" => Token::RandomNumber,
            "random.boolean" => Token::RandomBoolean,
            "faker.name" => Token::Name,
            "faker.firstName" => Token::FirstName,
            "faker.lastName" => Token::LastName,
            "faker.email" => Token::Email,
            "faker.avatar" => Token::Avatar,
            "faker.phone" => Token::Phone,
            "faker.address" => Token::Address,
            "faker.company" => Token::Company,
            "faker.lorem.sentence" => Token::LoremSentence,
            "faker.lorem.paragraph" => Token::LoremParagraph,
            "faker.image" => Token::Image,
            "faker.color" => Token::Color,
            "faker.hexColor" => Token::HexColor,
            "faker.url" => Token::Url,
            "faker.username" => Token::Username,
            _ => return None,
        };
        Some(token)
    }

    /// The name between the braces.
    pub fn name(&self) -> &'static str {
        match self {
            Token::Uuid => "uuid",
            Token::Timestamp => "timestamp",
            Token::Datetime => "datetime",
            Token::RandomNumber => "random.number",
            Token::RandomBoolean => "random.boolean",
            Token::Name => "faker.name",
            Token::FirstName => "faker.firstName",
            Token::LastName => "faker.lastName",
            Token::Email => "faker.email",
            Token::Avatar => "faker.avatar",
            Token::Phone => "faker.phone",
            Token::Address => "faker.address",
            Token::Company => "faker.company",
            Token::LoremSentence => "faker.lorem.sentence",
            Token::LoremParagraph => "faker.lorem.paragraph",
            Token::Image => "faker.image",
            Token::Color => "faker.color",
            Token::HexColor => "faker.hexColor",
            Token::Url => "faker.url",
            Token::Username => "faker.username",
        }
    }

    /// Generate a fresh value for this token.
    pub fn generate<R: Rng>(&self, rng: &mut R) -> String {
        match self {
            Token::Uuid => uuid::Uuid::new_v4().to_string(),
            Token::Timestamp => Utc::now().timestamp().to_string(),
            Token::Datetime => Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            Token::RandomNumber => rng.gen_range(0..RANDOM_NUMBER_MAX).to_string(),
            Token::RandomBoolean => rng.gen_bool(0.5).to_string(),
            Token::Name => fake::full_name(rng),
            Token::FirstName => fake::first_name(rng),
            Token::LastName => fake::last_name(rng),
            Token::Email => fake::email(rng),
            Token::Avatar => fake::avatar(rng),
            Token::Phone => fake::phone(rng),
            Token::Address => fake::address(rng),
            Token::Company => fake::company(rng),
            Token::LoremSentence => fake::sentence(rng),
            Token::LoremParagraph => fake::paragraph(rng),
            Token::Image => fake::image(rng),
            Token::Color => fake::color(rng),
            Token::HexColor => fake::hex_color(rng),
            Token::Url => fake::url(rng),
            Token::Username => fake::username(rng),
        }
    }
}

/// Expand every recognized placeholder in `template`.
///
/// Each occurrence is generated independently, so `{{uuid}} {{uuid}}` yields
/// two separately drawn values.
pub fn expand(template: &str) -> String {
    let mut rng = rand::thread_rng();
    expand_with(template, &mut rng)
}

/// Like [`expand`], drawing randomness from the supplied generator.
pub fn expand_with<R: Rng>(template: &str, rng: &mut R) -> String {
    if !template.contains("{{") {
        return template.to_string();
    }

    TOKEN_RE
        .replace_all(template, |caps: &Captures| match Token::from_name(&caps[1]) {
            Some(token) => token.generate(rng),
            None => caps[0].to_string(),
        })
        .into_owned()
}

/// Replace every `{{...}}` span with `0` so the template's JSON skeleton can
/// be checked. A placeholder inside a string stays a string, one outside a
/// string becomes a number.
pub fn neutralize(template: &str) -> String {
    ANY_PLACEHOLDER_RE.replace_all(template, "0").into_owned()
}

/// Result of rendering a template for a response.
#[derive(Debug, Clone, PartialEq)]
pub enum Rendered {
    /// The expanded template parsed as JSON.
    Json(serde_json::Value),
    /// The expanded template, returned verbatim.
    Text(String),
}

impl Rendered {
    pub fn content_type(&self) -> &'static str {
        match self {
            Rendered::Json(_) => "application/json",
            Rendered::Text(_) => "text/plain; charset=utf-8",
        }
    }

    pub fn into_body(self) -> String {
        match self {
            Rendered::Json(value) => value.to_string(),
            Rendered::Text(text) => text,
        }
    }
}

/// Expand `template` and parse it as JSON when possible.
pub fn render(template: &str) -> Rendered {
    let expanded = expand(template);
    match serde_json::from_str(&expanded) {
        Ok(value) => Rendered::Json(value),
        Err(_) => Rendered::Text(expanded),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn is_uuid_v4(s: &str) -> bool {
        static UUID_V4: Lazy<Regex> = Lazy::new(|| {
            Regex::new(r"^[0-9a-f]{8}-[0-9a-f]{4}-4[0-9a-f]{3}-[89ab][0-9a-f]{3}-[0-9a-f]{12}$")
                .unwrap()
        });
        UUID_V4.is_match(s)
    }

    #[test]
    fn test_no_placeholders_passthrough() {
        assert_eq!(expand(r#"{"static":true}"#), r#"{"static":true}"#);
        assert_eq!(expand(""), "");
    }

    #[test]
    fn test_uuid_twice_each_valid() {
        let out = expand("{{uuid}} {{uuid}}");
        let parts: Vec<&str> = out.split(' ').collect();
        assert_eq!(parts.len(), 2);
        assert!(is_uuid_v4(parts[0]), "bad uuid: {}", parts[0]);
        assert!(is_uuid_v4(parts[1]), "bad uuid: {}", parts[1]);
    }

    #[test]
    fn test_unknown_token_untouched() {
        let out = expand("{{faker.unknown}} and {{uuid}} and {{ uuid }}");
        assert!(out.starts_with("{{faker.unknown}} and "));
        assert!(out.ends_with(" and {{ uuid }}"));
    }

    #[test]
    fn test_every_token_expands() {
        for token in Token::ALL {
            let template = format!("{{{{{}}}}}", token.name());
            let out = expand(&template);
            assert!(!out.contains("{{"), "token {} not expanded", token.name());
            assert!(!out.is_empty(), "token {} expanded to nothing", token.name());
            assert_eq!(Token::from_name(token.name()), Some(token));
        }
    }

    #[test]
    fn test_scalar_tokens() {
        let n: u32 = expand("{{random.number}}").parse().unwrap();
        assert!(n < RANDOM_NUMBER_MAX);

        let b = expand("{{random.boolean}}");
        assert!(b == "true" || b == "false");

        let ts: i64 = expand("{{timestamp}}").parse().unwrap();
        assert!(ts > 1_600_000_000);

        let dt = expand("{{datetime}}");
        assert!(chrono::DateTime::parse_from_rfc3339(&dt).is_ok());
    }

    #[test]
    fn test_render_json_and_text() {
        match render(r#"{"id":"{{uuid}}","n":{{random.number}}}"#) {
            Rendered::Json(v) => {
                assert!(is_uuid_v4(v["id"].as_str().unwrap()));
                assert!(v["n"].is_u64());
            }
            other => panic!("expected JSON, got {:?}", other),
        }

        let text = render("hello {{faker.firstName}}");
        assert_eq!(text.content_type(), "text/plain; charset=utf-8");
        assert!(text.into_body().starts_with("hello "));
    }

    #[test]
    fn test_neutralize_keeps_json_shape() {
        let t = r#"{"id":"{{uuid}}","n":{{random.number}},"ok":{{random.boolean}},"x":"{{custom}}"}"#;
        let neutral = neutralize(t);
        assert!(serde_json::from_str::<serde_json::Value>(&neutral).is_ok());
    }
}
