pub mod api;
pub mod websocket;

use crate::cli::Args;
use crate::session::SessionLoop;
use std::error::Error;
use std::sync::Arc;

pub struct Server {
    addr: String,
    session_loop: Arc<SessionLoop>,
    args: Args,
}

impl Server {
    pub fn new(
        addr: String,
        session_loop: Arc<SessionLoop>,
        args: Args,
    ) -> Self {
        Self {
            addr,
            session_loop,
            args,
        }
    }

    pub async fn run(&self) -> Result<(), Box<dyn Error + Send + Sync>> {
        if let Some(http_port) = self.args.http_port {
            self.start_http_server(http_port).await?;
        }

        self.start_ws_server().await?;

        Ok(())
    }

    async fn start_http_server(&self, http_port: u16) -> Result<(), Box<dyn Error + Send + Sync>> {
        api::start_http_server(http_port, &self.addr).await
    }

    async fn start_ws_server(&self) -> Result<(), Box<dyn Error + Send + Sync>> {
        websocket::start_ws_server(
            &self.addr,
            self.session_loop.clone(),
        ).await
    }
}
