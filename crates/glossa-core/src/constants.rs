//! Annotation constants and configuration defaults
//!
//! Centralized location for property names and selectors

/// Style properties written onto the anchor element
pub mod style {
    /// Custom property holding the relative x offset
    pub const PROPERTY_X: &str = "--md-tooltip-x";

    /// Custom property holding the relative y offset
    pub const PROPERTY_Y: &str = "--md-tooltip-y";

    /// Prefix every custom property must carry
    pub const CUSTOM_PROPERTY_PREFIX: &str = "--";
}

/// Dismissal configuration
pub mod dismiss {
    /// Selector locating the dismiss target inside the index container
    pub const SELECTOR: &str = ":scope > :last-child";
}
