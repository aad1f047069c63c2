//! Terminal sink: where a session renders what it receives

/// Receives the output of one exec session.
///
/// Implementations are usually a terminal emulator pane. Calls arrive from the
/// session's socket task, never after the session has been closed.
#[cfg_attr(test, mockall::automock)]
pub trait TerminalSink: Send + Sync {
    /// Raw bytes from stdout or stderr, to be rendered verbatim
    fn write(&self, data: &[u8]);

    /// Clear the display before a fresh connection starts writing
    fn reset(&self);

    /// Render a connection notice styled as an error line
    fn connection_closed(&self, message: &str);
}
