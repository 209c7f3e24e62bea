//! Page chrome: `app-header` and `app-footer`. Neither produces nor consumes
//! events.

use crate::registry::Component;

pub const HEADER_TAG: &str = "app-header";
pub const HEADER_LOCATOR: &str = "/static/js/components/layout/app-header/app-header.js";

pub const FOOTER_TAG: &str = "app-footer";
pub const FOOTER_LOCATOR: &str = "/static/js/components/layout/app-footer/app-footer.js";

pub struct Header;

impl Component for Header {
    fn tag_name(&self) -> &str {
        HEADER_TAG
    }

    fn render(&self) -> String {
        "(LD)".to_owned()
    }
}

pub struct Footer;

impl Component for Footer {
    fn tag_name(&self) -> &str {
        FOOTER_TAG
    }

    fn render(&self) -> String {
        "\u{2764}\u{fe0f}".to_owned()
    }
}
