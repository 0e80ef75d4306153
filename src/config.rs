use std::env;

/// Upstream page URLs, one per dataset operation.
///
/// Constructed explicitly and handed to [`crate::DseClient::new`]; nothing in
/// the crate reads these from globals. `Default` points at the public
/// dsebd.org pages, `from_env` lets each one be overridden for staging or
/// tests.
#[derive(Debug, Clone)]
pub struct DseUrls {
    pub latest: String,
    pub dsex: String,
    pub top30: String,
    pub historical: String,
}

impl Default for DseUrls {
    fn default() -> Self {
        Self {
            latest: "https://www.dsebd.org/latest_share_price_scroll_l.php".to_string(),
            dsex: "https://www.dsebd.org/dseX_share.php".to_string(),
            top30: "https://www.dsebd.org/dse30_share.php".to_string(),
            historical: "https://www.dsebd.org/day_end_archive.php".to_string(),
        }
    }
}

impl DseUrls {
    /// Build from `DSE_*_URL` environment variables, falling back to the
    /// dsebd.org defaults for any that are unset.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            latest: env::var("DSE_LATEST_URL").unwrap_or(defaults.latest),
            dsex: env::var("DSE_DSEX_URL").unwrap_or(defaults.dsex),
            top30: env::var("DSE_TOP30_URL").unwrap_or(defaults.top30),
            historical: env::var("DSE_HISTORICAL_URL").unwrap_or(defaults.historical),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_point_at_dsebd() {
        let urls = DseUrls::default();
        for url in [&urls.latest, &urls.dsex, &urls.top30, &urls.historical] {
            assert!(url.starts_with("https://www.dsebd.org/"), "{url}");
        }
    }
}
