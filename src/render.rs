/// Result of rendering markup for preview.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Preview {
    Ready(String),
    /// The renderer is not loaded yet, or could not render this input.
    NotReady,
}

/// Turns markup text into a preview.
///
/// Implementations must be pure: rendering never changes session or catalog state. Any
/// `Fn(&str) -> Preview` closure is a renderer.
pub trait MarkupRenderer {
    fn render(&self, markup: &str) -> Preview;
}

impl<F> MarkupRenderer for F
where
    F: Fn(&str) -> Preview,
{
    fn render(&self, markup: &str) -> Preview {
        self(markup)
    }
}
