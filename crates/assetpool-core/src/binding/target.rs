//! The element a binding writes to.

use async_trait::async_trait;

/// Element kinds a binding knows how to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementTag {
    A,
    Img,
    Audio,
    Video,
    Source,
    Track,
    Iframe,
    Embed,
    /// SVG `<image>`.
    SvgImage,
    Other,
}

impl ElementTag {
    /// Parse an element name, case-insensitively.
    pub fn from_name(name: &str) -> Self {
        match name.to_ascii_uppercase().as_str() {
            "A" => ElementTag::A,
            "IMG" => ElementTag::Img,
            "AUDIO" => ElementTag::Audio,
            "VIDEO" => ElementTag::Video,
            "SOURCE" => ElementTag::Source,
            "TRACK" => ElementTag::Track,
            "IFRAME" => ElementTag::Iframe,
            "EMBED" => ElementTag::Embed,
            "IMAGE" => ElementTag::SvgImage,
            _ => ElementTag::Other,
        }
    }

    /// Attribute that carries the element's URL; `None` for unsupported tags.
    pub fn url_attribute(self) -> Option<&'static str> {
        match self {
            ElementTag::A => Some("href"),
            ElementTag::Img
            | ElementTag::Audio
            | ElementTag::Video
            | ElementTag::Source
            | ElementTag::Track
            | ElementTag::Iframe
            | ElementTag::Embed => Some("src"),
            ElementTag::SvgImage => Some("xlink:href"),
            ElementTag::Other => None,
        }
    }

    /// Elements the platform streams itself.
    pub fn is_media(self) -> bool {
        matches!(
            self,
            ElementTag::Audio | ElementTag::Video | ElementTag::Source | ElementTag::Track
        )
    }
}

/// Render surface of one element. Methods take `&self`; implementations
/// synchronize internally since bindings call them from spawned tasks.
#[async_trait]
pub trait RenderTarget: Send + Sync {
    fn tag(&self) -> ElementTag;

    fn attribute(&self, name: &str) -> Option<String>;

    fn set_attribute(&self, name: &str, value: &str);

    fn remove_attribute(&self, name: &str);

    /// Attach a new source for `url`. Used for `<source>`, whose `src`
    /// changes are not picked up once the parent has started loading.
    fn replace_source(&self, url: &str);

    /// Completes when the element has decoded its current image.
    async fn wait_for_decode(&self);

    /// Map a local file URL to one the renderer can load.
    fn convert_file_src(&self, url: &str) -> String {
        url.to_string()
    }
}
