use crate::cli::args::ExtractArgs;
use crate::exit_codes;
use anyhow::{anyhow, bail, Context};
use url::Url;

pub fn run(args: &ExtractArgs) -> i32 {
    match video_id(&args.url) {
        Ok(id) => {
            println!("{id}");
            exit_codes::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {e:#}");
            exit_codes::FAILED
        }
    }
}

/// Video ID from a YouTube watch or short-link URL.
pub fn video_id(raw: &str) -> anyhow::Result<String> {
    let url = Url::parse(raw.trim()).with_context(|| format!("not a URL: {raw}"))?;
    let host = url.host_str().unwrap_or_default().to_ascii_lowercase();

    let id = if host == "youtube.com" || host.ends_with(".youtube.com") {
        url.query_pairs()
            .find(|(k, _)| k == "v")
            .map(|(_, v)| v.into_owned())
    } else if host == "youtu.be" {
        url.path_segments()
            .and_then(|mut segments| segments.next())
            .map(str::to_string)
    } else {
        bail!("unsupported host {host:?} in {raw}");
    };

    id.filter(|id| !id.is_empty())
        .ok_or_else(|| anyhow!("no video id in {raw}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_watch_url() {
        assert_eq!(
            video_id("https://www.youtube.com/watch?v=dQw4w9WgXcQ").unwrap(),
            "dQw4w9WgXcQ"
        );
    }

    #[test]
    fn test_watch_url_with_extra_params() {
        assert_eq!(
            video_id("https://m.youtube.com/watch?feature=share&v=abc123&t=42").unwrap(),
            "abc123"
        );
        assert_eq!(video_id("https://youtube.com/watch?v=abc123").unwrap(), "abc123");
    }

    #[test]
    fn test_any_youtube_subdomain() {
        assert_eq!(
            video_id("https://music.youtube.com/watch?v=abc123&list=RD").unwrap(),
            "abc123"
        );
        assert!(video_id("https://notyoutube.com/watch?v=abc123").is_err());
    }

    #[test]
    fn test_short_link() {
        assert_eq!(video_id("https://youtu.be/abc123?t=10").unwrap(), "abc123");
    }

    #[test]
    fn test_host_is_case_insensitive() {
        assert_eq!(video_id("https://YouTu.be/abc123").unwrap(), "abc123");
    }

    #[test]
    fn test_rejects_other_hosts() {
        assert!(video_id("https://vimeo.com/12345").is_err());
        assert!(video_id("https://youtube.com.evil.example/watch?v=abc").is_err());
    }

    #[test]
    fn test_rejects_missing_id() {
        assert!(video_id("https://www.youtube.com/watch").is_err());
        assert!(video_id("https://www.youtube.com/watch?v=").is_err());
        assert!(video_id("https://youtu.be/").is_err());
    }

    #[test]
    fn test_rejects_non_url() {
        assert!(video_id("dQw4w9WgXcQ").is_err());
    }
}
