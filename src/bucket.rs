//! Bucket name sanitization and prefixing.

use crate::config::Config;

/// Applies the configured name transform to incoming buckets.
///
/// Sanitization keeps `[A-Za-z0-9._-]`, maps spaces to `_` and `/` to `-`,
/// and drops every other byte. The transform is idempotent. The configured
/// prefix is prepended as `<prefix>.<bucket>`; it always applies to the
/// daemon's own telemetry buckets and, when `prefixAllBuckets` is set, to
/// every bucket.
#[derive(Debug, Clone)]
pub struct BucketMapper {
    sanitize: bool,
    prefix: Option<String>,
    prefix_all: bool,
}

impl BucketMapper {
    pub fn from_config(cfg: &Config) -> Self {
        let prefix = if cfg.prefix_stats.is_empty() {
            None
        } else {
            Some(cfg.prefix_stats.clone())
        };

        Self {
            sanitize: cfg.sanitize_bucket_names,
            prefix,
            prefix_all: cfg.prefix_all_buckets,
        }
    }

    /// Transforms a client-supplied bucket name.
    pub fn map(&self, bucket: &str) -> String {
        self.transform(bucket, self.prefix_all)
    }

    /// Transforms one of the daemon's own telemetry bucket names.
    pub fn stat(&self, bucket: &str) -> String {
        self.transform(bucket, true)
    }

    fn transform(&self, bucket: &str, with_prefix: bool) -> String {
        let name = if self.sanitize {
            sanitize(bucket)
        } else {
            bucket.to_string()
        };

        match (&self.prefix, with_prefix) {
            (Some(prefix), true) => format!("{prefix}.{name}"),
            _ => name,
        }
    }
}

/// Character-wise bucket name cleanup.
pub fn sanitize(bucket: &str) -> String {
    let mut out = String::with_capacity(bucket.len());

    for c in bucket.chars() {
        match c {
            'A'..='Z' | 'a'..='z' | '0'..='9' | '.' | '_' | '-' => out.push(c),
            ' ' => out.push('_'),
            '/' => out.push('-'),
            _ => {}
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapper(sanitize: bool, prefix: &str, prefix_all: bool) -> BucketMapper {
        let cfg = Config {
            sanitize_bucket_names: sanitize,
            prefix_stats: prefix.to_string(),
            prefix_all_buckets: prefix_all,
            ..Config::default()
        };
        BucketMapper::from_config(&cfg)
    }

    #[test]
    fn test_sanitize_keeps_allowed_characters() {
        assert_eq!(sanitize("api.requests_ok-2"), "api.requests_ok-2");
    }

    #[test]
    fn test_sanitize_replaces_space_and_slash() {
        assert_eq!(sanitize("api latency"), "api_latency");
        assert_eq!(sanitize("disk/sda1"), "disk-sda1");
    }

    #[test]
    fn test_sanitize_drops_everything_else() {
        assert_eq!(sanitize("a:b|c@d"), "abcd");
        assert_eq!(sanitize("caf\u{e9}\u{1}stat"), "cafstat");
    }

    #[test]
    fn test_sanitize_is_idempotent() {
        let inputs = ["api latency", "disk/sda1", "a:b|c@d", "plain.name"];
        for input in inputs {
            let once = sanitize(input);
            assert_eq!(sanitize(&once), once);
        }
    }

    #[test]
    fn test_map_without_global_prefix() {
        let mapper = mapper(true, "statsd", false);
        assert_eq!(mapper.map("api latency"), "api_latency");
        assert_eq!(mapper.stat("bad_lines_seen"), "statsd.bad_lines_seen");
    }

    #[test]
    fn test_map_with_global_prefix() {
        let mapper = mapper(true, "statsd", true);
        assert_eq!(mapper.map("api.ok"), "statsd.api.ok");
    }

    #[test]
    fn test_map_with_sanitization_disabled() {
        let mapper = mapper(false, "", false);
        assert_eq!(mapper.map("a:b|c"), "a:b|c");
        assert_eq!(mapper.stat("packets_received"), "packets_received");
    }
}
