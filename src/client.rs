//! The `client` CLI verb: connects, subscribes, decodes Data/Alive frames,
//! and auto-reconnects on disconnect.

use crate::config::constants::CLIENT_RECONNECT_DELAY_MS;
use crate::protocol::wire::{
    build_frame, decode_data_body, FrameHeader, SubscribeBody, ALIVE, DATA, SUBSCRIBE,
};
use anyhow::Context;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{info, warn};

pub struct ClientConfig {
    pub host: String,
    pub port: u16,
    pub data_mask: u8,
    pub symbol: String,
    pub threshold: f64,
    /// Whether to log the rolling-50 VWAP and delta-from-roll fields, which
    /// are only meaningful (non-zero) when the server was started with
    /// extended analytics enabled.
    pub ext_vwap: bool,
}

/// Runs until the process is killed: connect, subscribe, read frames until
/// disconnect, wait 2s, reconnect.
pub async fn run(config: &ClientConfig) -> anyhow::Result<()> {
    loop {
        match run_once(config).await {
            Ok(()) => info!("connection closed by server"),
            Err(e) => warn!(error = %e, "connection error"),
        }
        info!(delay_ms = CLIENT_RECONNECT_DELAY_MS, "reconnecting");
        tokio::time::sleep(std::time::Duration::from_millis(CLIENT_RECONNECT_DELAY_MS)).await;
    }
}

async fn run_once(config: &ClientConfig) -> anyhow::Result<()> {
    let mut stream = TcpStream::connect((config.host.as_str(), config.port))
        .await
        .with_context(|| format!("connecting to {}:{}", config.host, config.port))?;

    let subscribe = SubscribeBody {
        data_type_mask: config.data_mask,
        symbol: config.symbol.clone(),
        whale_threshold: config.threshold,
    };
    let body = subscribe.encode().context("encoding subscribe body")?;
    let frame = build_frame(SUBSCRIBE, 0, &body);
    stream.write_all(&frame).await.context("sending subscribe")?;
    info!(symbol = %config.symbol, threshold = config.threshold, "subscribed");

    loop {
        let mut header_buf = [0u8; FrameHeader::SIZE];
        stream
            .read_exact(&mut header_buf)
            .await
            .context("reading frame header")?;
        let header = FrameHeader::decode(&header_buf).context("decoding frame header")?;

        let mut body_buf = vec![0u8; header.len as usize];
        if header.len > 0 {
            stream
                .read_exact(&mut body_buf)
                .await
                .context("reading frame body")?;
        }

        match header.data_type {
            DATA => {
                let records = decode_data_body(&body_buf).context("decoding data body")?;
                for r in &records {
                    if config.ext_vwap {
                        info!(
                            symbol = %r.symbol,
                            price = r.price,
                            quantity = r.quantity,
                            is_sell = r.is_sell,
                            vwap_session = r.vwap_session,
                            vwap_roll50 = r.vwap_roll50,
                            delta_roll = r.delta_roll,
                            "whale"
                        );
                    } else {
                        info!(
                            symbol = %r.symbol,
                            price = r.price,
                            quantity = r.quantity,
                            is_sell = r.is_sell,
                            vwap_session = r.vwap_session,
                            "whale"
                        );
                    }
                }
            }
            ALIVE => {
                info!("alive");
            }
            other => {
                warn!(data_type = other, "unexpected frame type; closing");
                return Ok(());
            }
        }
    }
}
