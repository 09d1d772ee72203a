//! Wire format for a ratchet-encrypted payload, per spec.md §4.8:
//! `DrMessage { header{dh, n, pn}, ciphertext }`.

use serde::{Deserialize, Serialize};
use va_crypto::ratchet::RatchetHeader;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DrMessage {
    pub header: RatchetHeader,
    #[serde(with = "crate::message::base64_bytes")]
    pub ciphertext: Vec<u8>,
}
