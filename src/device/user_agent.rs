use axum::http::HeaderMap;
use std::net::SocketAddr;

use crate::message::SenderDevice;

/// Coarse description of a client parsed from its User-Agent header
#[derive(Debug, Clone, PartialEq)]
pub struct UserAgentInfo {
    pub device_class: String,
    pub model: String,
    pub os: String,
    pub browser: String,
}

impl UserAgentInfo {
    /// Parses the common browser/OS tokens; anything unrecognised is reported as "Other"
    pub fn parse(user_agent: &str) -> Self {
        let (os_family, os_major) = detect_os(user_agent);
        let (browser_family, browser_major) = detect_browser(user_agent);
        let (device_class, brand) = detect_device(user_agent, os_family);

        let model = [brand, device_class.as_str(), os_family]
            .iter()
            .filter(|part| !part.is_empty() && **part != "Other")
            .copied()
            .collect::<Vec<_>>()
            .join(" ");

        Self {
            device_class,
            model,
            os: join_version(os_family, &os_major),
            browser: join_version(browser_family, &browser_major),
        }
    }

    /// The `type`/`os`/`browser` map stored with each message
    pub fn sender_device(&self) -> SenderDevice {
        SenderDevice::from([
            ("type".to_string(), self.device_class.clone()),
            ("os".to_string(), self.os.clone()),
            ("browser".to_string(), self.browser.clone()),
        ])
    }
}

fn join_version(family: &str, major: &str) -> String {
    if major.is_empty() {
        family.to_string()
    } else {
        format!("{} {}", family, major)
    }
}

/// Leading digits of the text right after `token`
fn major_after(user_agent: &str, token: &str) -> Option<String> {
    let start = user_agent.find(token)? + token.len();
    let major: String = user_agent[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    Some(major)
}

fn detect_os(ua: &str) -> (&'static str, String) {
    if ua.contains("iPhone OS") || ua.contains("iPad") {
        let major = major_after(ua, "OS ").unwrap_or_default();
        ("iOS", major)
    } else if let Some(major) = major_after(ua, "Android ") {
        ("Android", major)
    } else if let Some(major) = major_after(ua, "Windows NT ") {
        ("Windows", major)
    } else if let Some(major) = major_after(ua, "Mac OS X ") {
        ("Mac OS X", major)
    } else if ua.contains("CrOS") {
        ("Chrome OS", String::new())
    } else if ua.contains("Linux") {
        ("Linux", String::new())
    } else {
        ("Other", String::new())
    }
}

fn detect_browser(ua: &str) -> (&'static str, String) {
    // Order matters: Edge and Opera also advertise Chrome, Chrome also advertises Safari
    const TOKENS: [(&str, &str); 7] = [
        ("Edg/", "Edge"),
        ("OPR/", "Opera"),
        ("Firefox/", "Firefox"),
        ("CriOS/", "Chrome Mobile iOS"),
        ("Chrome/", "Chrome"),
        ("Version/", "Safari"),
        ("curl/", "curl"),
    ];

    for (token, family) in TOKENS {
        if let Some(major) = major_after(ua, token) {
            return (family, major);
        }
    }
    ("Other", String::new())
}

fn detect_device(ua: &str, os_family: &str) -> (String, &'static str) {
    if ua.contains("iPhone") {
        ("iPhone".to_string(), "Apple")
    } else if ua.contains("iPad") {
        ("iPad".to_string(), "Apple")
    } else if ua.contains("Macintosh") {
        ("Mac".to_string(), "Apple")
    } else if os_family == "Android" {
        let class = if ua.contains("Mobile") { "Android Phone" } else { "Android Tablet" };
        (class.to_string(), "")
    } else {
        ("Other".to_string(), "")
    }
}

/// Client IP: first `X-Forwarded-For` entry, then `X-Real-IP`, then the socket peer
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .or_else(|| headers.get("x-real-ip"))
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(|ip| ip.trim().to_string())
        .filter(|ip| !ip.is_empty());

    forwarded
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_default()
}
