use std::{fmt, path::Path};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Platform {
    YouTube,
    X,
    TikTok,
    Instagram,
    Pinterest,
    Spotify,
    Unsupported,
}

/// Declaration order is the match order: the first platform with a matching
/// prefix wins.
pub const PLATFORM_PREFIXES: &[(Platform, &[&str])] = &[
    (
        Platform::YouTube,
        &[
            "https://www.youtube.com/watch?v=",
            "https://youtube.com/watch?v",
            "https://youtu.be/",
            "https://www.youtube.com/shorts/",
            "https://youtube.com/shorts/",
        ],
    ),
    (Platform::X, &["https://x.com/", "https://twitter.com/"]),
    (
        Platform::TikTok,
        &["https://www.tiktok.com/", "https://vt.tiktok.com/"],
    ),
    (
        Platform::Instagram,
        &[
            "https://www.instagram.com/reel/",
            "https://instagram.com/reel/",
        ],
    ),
    (
        Platform::Pinterest,
        &[
            "https://pin.it/",
            "https://www.pinterest.com/pin/",
            "https://in.pinterest.com/pin/",
        ],
    ),
    (Platform::Spotify, &["https://open.spotify.com/track/"]),
];

/// Exact, case-sensitive prefix match. Never fails.
pub fn classify(url: &str) -> Platform {
    PLATFORM_PREFIXES
        .iter()
        .find(|(_, prefixes)| prefixes.iter().any(|prefix| url.starts_with(prefix)))
        .map(|(platform, _)| *platform)
        .unwrap_or(Platform::Unsupported)
}

impl Platform {
    pub fn name(self) -> &'static str {
        match self {
            Platform::YouTube => "YouTube",
            Platform::X => "X (Twitter)",
            Platform::TikTok => "TikTok",
            Platform::Instagram => "Instagram",
            Platform::Pinterest => "Pinterest",
            Platform::Spotify => "Spotify",
            Platform::Unsupported => "unsupported",
        }
    }

    /// `None` only for `Unsupported`.
    pub fn media_kind(self) -> Option<MediaKind> {
        match self {
            Platform::YouTube | Platform::X | Platform::TikTok | Platform::Instagram => {
                Some(MediaKind::Video)
            }
            Platform::Pinterest => Some(MediaKind::Photo),
            Platform::Spotify => Some(MediaKind::Audio),
            Platform::Unsupported => None,
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How a finished file is delivered. The extension is the contract between
/// the dispatcher and the chat layer.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MediaKind {
    Video,
    Photo,
    Audio,
}

impl MediaKind {
    pub const fn extension(self) -> &'static str {
        match self {
            MediaKind::Video => "mp4",
            MediaKind::Photo => "png",
            MediaKind::Audio => "mp3",
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()? {
            "mp4" => Some(MediaKind::Video),
            "png" => Some(MediaKind::Photo),
            "mp3" => Some(MediaKind::Audio),
            _ => None,
        }
    }
}

pub fn supported_links_text() -> String {
    let mut text = String::new();
    for (platform, prefixes) in PLATFORM_PREFIXES {
        text.push_str(&format!("<b>{platform}</b>\n"));
        for prefix in prefixes.iter() {
            text.push_str(prefix);
            text.push('\n');
        }
        text.push('\n');
    }
    text.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_registered_prefix_classifies_to_its_platform() {
        for (platform, prefixes) in PLATFORM_PREFIXES {
            assert!(!prefixes.is_empty());
            for prefix in prefixes.iter() {
                assert_eq!(classify(&format!("{prefix}abc123")), *platform, "{prefix}");
            }
        }
    }

    #[test]
    fn classify_examples() {
        assert_eq!(classify("https://youtu.be/abc"), Platform::YouTube);
        assert_eq!(classify("https://vt.tiktok.com/ZS8abc/"), Platform::TikTok);
        assert_eq!(
            classify("https://open.spotify.com/track/4uLU6hMCjMI75M1A2tKUQC"),
            Platform::Spotify
        );
        assert_eq!(classify("https://example.com/x"), Platform::Unsupported);
        assert_eq!(classify(""), Platform::Unsupported);
    }

    #[test]
    fn classify_is_case_sensitive_and_unnormalized() {
        assert_eq!(classify("HTTPS://youtu.be/abc"), Platform::Unsupported);
        assert_eq!(classify("http://youtu.be/abc"), Platform::Unsupported);
        assert_eq!(classify("https://instagram.com/p/abc"), Platform::Unsupported);
        assert_eq!(classify(" https://youtu.be/abc"), Platform::Unsupported);
    }

    #[test]
    fn extension_contract() {
        assert_eq!(Platform::YouTube.media_kind(), Some(MediaKind::Video));
        assert_eq!(Platform::Pinterest.media_kind(), Some(MediaKind::Photo));
        assert_eq!(Platform::Spotify.media_kind(), Some(MediaKind::Audio));
        assert_eq!(Platform::Unsupported.media_kind(), None);
        for kind in [MediaKind::Video, MediaKind::Photo, MediaKind::Audio] {
            let path = std::path::PathBuf::from(format!("out.{}", kind.extension()));
            assert_eq!(MediaKind::from_path(&path), Some(kind));
        }
        assert_eq!(MediaKind::from_path(Path::new("out.webm")), None);
    }

    #[test]
    fn supported_links_lists_every_prefix() {
        let text = supported_links_text();
        for (_, prefixes) in PLATFORM_PREFIXES {
            for prefix in prefixes.iter() {
                assert!(text.contains(prefix));
            }
        }
        assert!(!text.contains("unsupported"));
    }
}
