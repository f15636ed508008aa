//! Protocol Module
//!
//! Defines the wire protocol shared by every server variant and the client.
//!
//! ## Frame Format
//! ```text
//! ┌──────────────┬──────────────────────────────┬──────────────┐
//! │ Len (4, LE)  │  Body (bincode Message)      │ Footer (5)   │
//! └──────────────┴──────────────────────────────┴──────────────┘
//!                 ◄──────────────── Len ────────────────────────►
//! ```
//!
//! The length field counts body and footer. The footer is the fixed marker
//! `@EOF@`; it is checked, never parsed.
//!
//! ### Message Kinds
//! - 1: GET           - request, key only
//! - 2: GET_RESPONSE  - response, key + value + status
//! - 3: PUT_OR_UPDATE - request (key + value) and its acknowledgement (status)
//!
//! ### Status Codes
//! - 0: UNSET (requests)
//! - 1: OK
//! - 2: NOT_OK

mod message;
mod codec;
mod reader;

pub use message::{Message, MessageKind, Status};
pub use codec::{
    decode, encode, read_message, write_message, FOOTER, FOOTER_SIZE, HEADER_SIZE,
    MAX_FRAME_SIZE,
};
pub use reader::FrameReader;
