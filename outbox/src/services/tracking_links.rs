//! Click and open tracking markup
//!
//! Links are rewritten to `{base}/click?tid=<id>&url=<original>` and the open
//! pixel points at `{base}/open?tid=<id>`. The server behind the base URL is
//! out of scope here.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use url::Url;

use crate::types::error::{OutboxError, Result};

static HREF_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)\bhref\s*=\s*(?:"([^"]*)"|'([^']*)')"#).expect("valid href regex")
});

static BODY_CLOSE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)</body\s*>").expect("valid body regex"));

/// Schemes and fragments that are never wrapped
const UNTRACKED_PREFIXES: [&str; 4] = ["mailto:", "tel:", "javascript:", "#"];

#[derive(Debug, Clone)]
pub struct TrackingLinks {
    base: Url,
}

impl TrackingLinks {
    pub fn new(base_url: &str) -> Result<Self> {
        let base = Url::parse(base_url).map_err(|e| {
            OutboxError::Config(format!("Invalid tracking base URL '{}': {}", base_url, e))
        })?;
        if base.cannot_be_a_base() {
            return Err(OutboxError::Config(format!(
                "Tracking base URL '{}' cannot hold paths",
                base_url
            )));
        }
        Ok(Self { base })
    }

    fn endpoint_path(&self, name: &str) -> Url {
        let mut url = self.base.clone();
        url.set_query(None);
        url.set_fragment(None);
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push(name);
        }
        url
    }

    fn endpoint(&self, name: &str, tracking_id: &str) -> Url {
        let mut url = self.endpoint_path(name);
        url.query_pairs_mut().append_pair("tid", tracking_id);
        url
    }

    /// Whether `href` already points at our click or open endpoint
    fn is_tracking_url(&self, href: &str) -> bool {
        let Ok(url) = Url::parse(&href.replace("&amp;", "&")) else {
            return false;
        };
        if url.origin() != self.base.origin() {
            return false;
        }
        ["click", "open"]
            .iter()
            .any(|name| url.path() == self.endpoint_path(name).path())
    }

    pub fn click_url(&self, tracking_id: &str, target: &str) -> String {
        let mut url = self.endpoint("click", tracking_id);
        url.query_pairs_mut().append_pair("url", target);
        url.into()
    }

    pub fn open_url(&self, tracking_id: &str) -> String {
        self.endpoint("open", tracking_id).into()
    }

    fn should_track(&self, href: &str) -> bool {
        let href = href.trim();
        if href.is_empty() {
            return false;
        }
        let lower = href.to_ascii_lowercase();
        if UNTRACKED_PREFIXES.iter().any(|p| lower.starts_with(p)) {
            return false;
        }
        !self.is_tracking_url(href)
    }

    /// Wrap every trackable `href` in the HTML with a click redirect
    pub fn add_tracking_to_links(&self, html: &str, tracking_id: &str) -> String {
        HREF_RE
            .replace_all(html, |caps: &Captures| {
                let (href, quote) = match (caps.get(1), caps.get(2)) {
                    (Some(m), _) => (m.as_str(), '"'),
                    (None, Some(m)) => (m.as_str(), '\''),
                    (None, None) => return caps[0].to_string(),
                };

                if !self.should_track(href) {
                    return caps[0].to_string();
                }

                let target = href.trim().replace("&amp;", "&");
                let tracked = self.click_url(tracking_id, &target).replace('&', "&amp;");
                format!("href={quote}{tracked}{quote}")
            })
            .into_owned()
    }

    /// Invisible 1x1 image that reports an open
    pub fn generate_tracking_pixel(&self, tracking_id: &str) -> String {
        format!(
            r#"<img src="{}" width="1" height="1" alt="" style="display:none" />"#,
            self.open_url(tracking_id)
        )
    }

    /// Rewrite links and insert the open pixel before `</body>` (or at the end)
    pub fn instrument_html(&self, html: &str, tracking_id: &str) -> String {
        let tracked = self.add_tracking_to_links(html, tracking_id);
        let pixel = self.generate_tracking_pixel(tracking_id);

        match BODY_CLOSE_RE.find(&tracked) {
            Some(close) => format!(
                "{}{}{}",
                &tracked[..close.start()],
                pixel,
                &tracked[close.start()..]
            ),
            None => format!("{}{}", tracked, pixel),
        }
    }
}
