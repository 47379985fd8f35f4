/// Position of the statement scanner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum State {
    /// Copying statement text verbatim.
    Copying,
    /// Inside `/**...**/`, looking for the end marker. `marker` is where `/**` starts.
    InAnnotationBody { marker: usize },
    /// Just past `**/'`; the quoted literal that follows is uploaded.
    InLiteralAfterAnnotation,
}
