//! Document rewrite - 플러그인 문서 상대 참조 해석
//!
//! 샌드박스 안에서는 문서의 원래 위치를 알 수 없으므로, 인라인 스타일의
//! `url(...)` 참조를 플러그인 기준 URL로 풀고 `<base href>`를 넣어 나머지
//! 상대 참조(스크립트, 이미지, 링크)도 같은 기준으로 해석되게 합니다.

use regex::{Captures, Regex};
use tracing::{debug, trace};
use url::Url;

use quill_foundation::Result;

lazy_static::lazy_static! {
    static ref URL_REF: Regex =
        Regex::new(r#"(?i)url\(\s*(?:"([^"]*)"|'([^']*)'|([^'")\s]+))\s*\)"#).unwrap();
    static ref STYLE_BLOCK: Regex =
        Regex::new(r"(?is)(<style\b[^>]*>)(.*?)(</style\s*>)").unwrap();
    static ref STYLE_ATTR: Regex =
        Regex::new(r#"(?i)(\sstyle\s*=\s*)(?:"([^"]*)"|'([^']*)')"#).unwrap();
    static ref HEAD_OPEN: Regex = Regex::new(r"(?i)<head\b[^>]*>").unwrap();
    static ref HTML_OPEN: Regex = Regex::new(r"(?i)<html\b[^>]*>").unwrap();
}

// ============================================================================
// 기준 URL
// ============================================================================

/// 플러그인 문서 기준 URL
///
/// `<host origin>/<base_path>/<plugin_id>/<문서 디렉토리>/`
pub fn plugin_base_url(
    host: &Url,
    base_path: &str,
    plugin_id: &str,
    document_url: &str,
) -> Result<Url> {
    let mut base = host.clone();
    base.set_query(None);
    base.set_fragment(None);

    let base_path = base_path.trim_matches('/');
    if base_path.is_empty() {
        base.set_path(&format!("/{}/", plugin_id));
    } else {
        base.set_path(&format!("/{}/{}/", base_path, plugin_id));
    }

    let document_path = document_url
        .split(&['?', '#'][..])
        .next()
        .unwrap_or_default()
        .trim_start_matches("./")
        .trim_start_matches('/');

    match document_path.rfind('/') {
        Some(index) => Ok(base.join(&document_path[..=index])?),
        None => Ok(base),
    }
}

/// 이미 절대 참조인지 (스킴, `//`, `data:`, `#`, 빈 값)
fn is_absolute_reference(reference: &str) -> bool {
    let reference = reference.trim();
    if reference.is_empty() || reference.starts_with('#') || reference.starts_with("//") {
        return true;
    }

    match reference.find(':') {
        Some(index) => {
            let scheme = &reference[..index];
            !scheme.is_empty()
                && scheme.starts_with(|c: char| c.is_ascii_alphabetic())
                && scheme
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '-' || c == '.')
        }
        None => false,
    }
}

// ============================================================================
// 스타일 참조 해석
// ============================================================================

/// CSS 텍스트 안의 상대 `url(...)` 해석
pub fn resolve_css_urls(css: &str, base: &Url) -> String {
    URL_REF
        .replace_all(css, |caps: &Captures| {
            let (reference, quote) = if let Some(m) = caps.get(1) {
                (m.as_str(), "\"")
            } else if let Some(m) = caps.get(2) {
                (m.as_str(), "'")
            } else {
                (caps.get(3).map_or("", |m| m.as_str()), "")
            };

            if is_absolute_reference(reference) {
                return caps[0].to_string();
            }

            match base.join(reference.trim()) {
                Ok(resolved) => format!("url({quote}{}{quote})", resolved),
                Err(e) => {
                    trace!("Leaving unresolvable reference {}: {}", reference, e);
                    caps[0].to_string()
                }
            }
        })
        .into_owned()
}

/// `<style>` 블록과 `style="..."` 속성의 상대 참조 해석
pub fn resolve_style_urls(html: &str, base: &Url) -> String {
    let output = STYLE_BLOCK.replace_all(html, |caps: &Captures| {
        format!(
            "{}{}{}",
            &caps[1],
            resolve_css_urls(&caps[2], base),
            &caps[3]
        )
    });

    STYLE_ATTR
        .replace_all(&output, |caps: &Captures| match (caps.get(2), caps.get(3)) {
            (Some(value), _) => {
                format!("{}\"{}\"", &caps[1], resolve_css_urls(value.as_str(), base))
            }
            (None, Some(value)) => {
                format!("{}'{}'", &caps[1], resolve_css_urls(value.as_str(), base))
            }
            (None, None) => caps[0].to_string(),
        })
        .into_owned()
}

// ============================================================================
// <base> 삽입
// ============================================================================

/// `<head>` 바로 뒤에 `<base href>` 삽입 (head가 없으면 생성)
pub fn insert_base_tag(html: &str, base: &Url) -> String {
    let tag = format!("<base href=\"{}\">", escape_attribute(base.as_str()));

    if let Some(m) = HEAD_OPEN.find(html) {
        return format!("{}{}{}", &html[..m.end()], tag, &html[m.end()..]);
    }

    debug!("Document has no <head>, synthesizing one");
    let head = format!("<head>{}</head>", tag);
    match HTML_OPEN.find(html) {
        Some(m) => format!("{}{}{}", &html[..m.end()], head, &html[m.end()..]),
        None => format!("{}{}", head, html),
    }
}

fn escape_attribute(value: &str) -> String {
    value.replace('&', "&amp;").replace('"', "&quot;")
}

/// 문서 전체 재작성
pub fn rewrite_document(html: &str, base: &Url) -> String {
    insert_base_tag(&resolve_style_urls(html, base), base)
}
