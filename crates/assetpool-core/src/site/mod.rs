//! Logged-in sites and their per-session capability state.
//!
//! Each [`Site`] carries the credentials the URL rewriter needs and a
//! tri-state flag recording whether its host serves the token-path endpoint.
//! The flag is session state: it starts `Unknown`, is settled at most once by
//! the capability prober, and is discarded with the site at logout.

mod entry;
mod registry;

pub(crate) use entry::ProbeFuture;
pub use entry::{Site, SiteInfo, TokenPathSupport};
pub use registry::SiteRegistry;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::url_rewrite::UrlDialect;

    fn info(id: &str, key: Option<&str>) -> SiteInfo {
        SiteInfo {
            id: id.to_string(),
            url: format!("http://{id}"),
            token: "TOK".to_string(),
            access_key: key.map(str::to_string),
        }
    }

    #[test]
    fn support_maps_to_dialect() {
        assert_eq!(TokenPathSupport::Unknown.dialect(), UrlDialect::TokenPath);
        assert_eq!(TokenPathSupport::Supported.dialect(), UrlDialect::TokenPath);
        assert_eq!(TokenPathSupport::Unsupported.dialect(), UrlDialect::Legacy);
    }

    #[test]
    fn fix_url_follows_capability_flag() {
        let site = Site::new(info("site", Some("KEY")));
        let raw = "http://site/pluginfile.php/1/a.png";
        assert_eq!(
            site.fix_url(raw),
            "http://site/tokenpluginfile.php/KEY/1/a.png?offline=1"
        );

        site.capability_state().support = TokenPathSupport::Unsupported;
        assert_eq!(
            site.fix_url(raw),
            "http://site/webservice/pluginfile.php/1/a.png?token=TOK&offline=1"
        );
    }

    #[test]
    fn registry_tracks_current_site() {
        let reg = SiteRegistry::new();
        assert!(reg.current_site().is_none());

        reg.add_site(info("a", None));
        reg.add_site(info("b", None));
        assert_eq!(reg.current_site().unwrap().id(), "a");
        assert_eq!(reg.site_ids(), vec!["a".to_string(), "b".to_string()]);

        assert!(reg.set_current("b"));
        assert!(!reg.set_current("missing"));
        assert_eq!(reg.current_site().unwrap().id(), "b");

        reg.remove_site("b");
        assert!(reg.current_site().is_none());
        assert!(reg.get_site("b").is_none());
        assert!(reg.get_site("a").is_some());
    }

    #[test]
    fn re_adding_a_site_resets_capability() {
        let reg = SiteRegistry::new();
        let first = reg.add_site(info("a", Some("K")));
        first.capability_state().support = TokenPathSupport::Supported;
        let second = reg.add_site(info("a", Some("K")));
        assert_eq!(second.token_path_support(), TokenPathSupport::Unknown);
    }
}
