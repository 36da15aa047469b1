//! payqr-gateway: VietQR HTTP client (QR generation, bank list sync)

pub mod vietqr;

pub use vietqr::{GatewayConfig, QrRequest, VietQrClient, decode_data_url};
