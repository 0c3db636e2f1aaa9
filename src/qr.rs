//! Scannable-code rendering seam
//!
//! Turning the login URL into a visual code is the display layer's
//! business; the protocol only needs *some* text block to hand to the
//! listener. Renderers are caller-owned objects passed to the client at
//! construction time, never a process-wide default.

/// Renders a payload into a scannable or copyable text block
///
/// `render` is infallible by signature: implementations must degrade to
/// returning the raw payload rather than fail, since a missing visual
/// code must never abort an otherwise healthy handshake.
pub trait QrRenderer: Send + Sync {
    /// Render `url` into a text block a human can scan or copy
    fn render(&self, url: &str) -> String;
}

/// Fallback renderer that frames the raw URL for manual entry
pub struct PlainTextRenderer;

impl QrRenderer for PlainTextRenderer {
    fn render(&self, url: &str) -> String {
        format!("[scan or open this link on the authorized device]\n{url}")
    }
}
