//! The htmlfile transport: a long-lived HTML document whose body is a
//! stream of inline `<script>` chunks invoking a parent-frame callback.

use std::sync::Arc;

use bytes::Bytes;

use sockrs_protocol::{CloseReason, HEARTBEAT_FRAME, OPEN_FRAME, encode_data_frames, htmlfile_chunk};

use crate::config::ServerConfig;
use crate::connection::Connection;
use crate::error::TransportResult;
use crate::transports::{Transport, TransportKind, account_stream_bytes, settle_close};

/// The `htmlfile` transport.
#[derive(Debug)]
pub struct HtmlFile {
    config: Arc<ServerConfig>,
}

impl HtmlFile {
    /// Create the transport for a server configuration.
    pub fn new(config: Arc<ServerConfig>) -> Self {
        Self { config }
    }

    /// The document head that precedes the script chunks, padded past the
    /// browser sniffing threshold and bound to the page callback name.
    pub fn prelude(callback: &str) -> Bytes {
        let head = format!(
            "<!doctype html>\n\
             <html><head>\n\
             \x20 <meta http-equiv=\"X-UA-Compatible\" content=\"IE=edge\" />\n\
             \x20 <meta http-equiv=\"Content-Type\" content=\"text/html; charset=UTF-8\" />\n\
             </head><body><h2>Don't panic!</h2>\n\
             \x20 <script>\n\
             \x20   document.domain = document.domain;\n\
             \x20   var c = parent.{callback};\n\
             \x20   c.start();\n\
             \x20   function p(d) {{c.message(d);}};\n\
             \x20   window.onload = function() {{c.stop();}};\n\
             \x20 </script>"
        );
        let padding = 1024usize.saturating_sub(head.len()) + 20;
        let mut page = head;
        page.extend(std::iter::repeat_n(' ', padding));
        page.push_str("\r\n\r\n");
        Bytes::from(page)
    }

    fn write_chunk(&self, connection: &Connection, frame: &str) -> TransportResult<usize> {
        connection.write(Bytes::from(htmlfile_chunk(frame)))
    }
}

impl Transport for HtmlFile {
    fn kind(&self) -> TransportKind {
        TransportKind::HtmlFile
    }

    fn send_open(&self, connection: &Connection) -> TransportResult<()> {
        self.write_chunk(connection, OPEN_FRAME)?;
        Ok(())
    }

    fn send_heartbeat(&self, connection: &Connection) -> TransportResult<()> {
        self.write_chunk(connection, HEARTBEAT_FRAME)?;
        Ok(())
    }

    fn send_messages(&self, connection: &Connection, messages: &[String]) -> TransportResult<()> {
        let written = self.write_chunk(connection, &encode_data_frames(messages))?;
        account_stream_bytes(connection, written, self.config.max_stream_size);
        Ok(())
    }

    fn send_close(&self, connection: &Connection, reason: CloseReason) -> TransportResult<()> {
        settle_close(connection, self.write_chunk(connection, reason.frame()))
    }
}
