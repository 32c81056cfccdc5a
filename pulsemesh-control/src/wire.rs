/**
 * PROTOCOLE WEBSOCKET - Codec de trames et poignée de main
 *
 * RÔLE :
 * Encode et décode les trames WebSocket (RFC 6455) sans dépendre d'une
 * bibliothèque WS. Le plan de contrôle ne pousse que des trames texte ;
 * côté réception il ne traite que ping et close.
 *
 * FONCTIONNEMENT :
 * - accept_token : SHA-1(clé client + GUID) en base64 pour le 101
 * - encode_frame : FIN toujours posé, longueur sur 7 bits, 16 bits ou 64 bits
 * - decode_frame : décodage incrémental, Ok(None) tant que la trame est
 *   incomplète, démasquage appliqué quand le bit MASK est posé
 *
 * Les trames sortantes ne sont jamais masquées (serveur → client).
 */

use sha1::{Digest, Sha1};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use thiserror::Error;

/// GUID fixé par la RFC 6455, concaténé à la clé client avant hachage.
pub const WS_ACCEPT_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

pub const OP_TEXT: u8 = 0x1;
pub const OP_CLOSE: u8 = 0x8;
pub const OP_PING: u8 = 0x9;
pub const OP_PONG: u8 = 0xA;

/// Taille maximale acceptée pour une trame entrante (1 MiB). Le flux est
/// unidirectionnel, un client n'a aucune raison d'envoyer plus.
pub const MAX_INBOUND_PAYLOAD: usize = 1024 * 1024;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("frame payload of {len} bytes exceeds the {max} byte limit")]
    PayloadTooLarge { len: u64, max: usize },
    #[error("control frame 0x{opcode:X} declares {len} bytes (max 125)")]
    ControlFrameTooLong { opcode: u8, len: u64 },
}

/// Trame décodée. `fin` est exposé mais le serveur ne réassemble pas les
/// messages fragmentés : le flux entrant attendu se limite aux trames de
/// contrôle, toujours finales.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub fin: bool,
    pub opcode: u8,
    pub payload: Vec<u8>,
}

/// Valeur du header `Sec-WebSocket-Accept` pour une clé client donnée.
pub fn accept_token(client_key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(client_key.as_bytes());
    hasher.update(WS_ACCEPT_GUID.as_bytes());
    BASE64.encode(hasher.finalize())
}

/// Encode une trame finale non masquée avec l'opcode donné.
pub fn encode_frame(opcode: u8, payload: &[u8]) -> Vec<u8> {
    let len = payload.len();
    let mut frame = Vec::with_capacity(len + 10);
    frame.push(0x80 | (opcode & 0x0F));
    if len < 126 {
        frame.push(len as u8);
    } else if len <= 0xFFFF {
        frame.push(126);
        frame.extend_from_slice(&(len as u16).to_be_bytes());
    } else {
        frame.push(127);
        frame.extend_from_slice(&(len as u64).to_be_bytes());
    }
    frame.extend_from_slice(payload);
    frame
}

/// Tente de décoder une trame au début de `buf`.
///
/// Retourne `Ok(None)` si le tampon ne contient pas encore la trame
/// complète, sinon la trame et le nombre d'octets consommés.
pub fn decode_frame(buf: &[u8]) -> Result<Option<(Frame, usize)>, ProtocolError> {
    if buf.len() < 2 {
        return Ok(None);
    }
    let fin = buf[0] & 0x80 != 0;
    let opcode = buf[0] & 0x0F;
    let masked = buf[1] & 0x80 != 0;

    let (payload_len, mut offset) = match buf[1] & 0x7F {
        126 => {
            if buf.len() < 4 {
                return Ok(None);
            }
            (u64::from(u16::from_be_bytes([buf[2], buf[3]])), 4usize)
        }
        127 => {
            if buf.len() < 10 {
                return Ok(None);
            }
            let len = u64::from_be_bytes([
                buf[2], buf[3], buf[4], buf[5], buf[6], buf[7], buf[8], buf[9],
            ]);
            (len, 10usize)
        }
        n => (u64::from(n), 2usize),
    };

    if opcode >= OP_CLOSE && payload_len > 125 {
        return Err(ProtocolError::ControlFrameTooLong {
            opcode,
            len: payload_len,
        });
    }
    if payload_len > MAX_INBOUND_PAYLOAD as u64 {
        return Err(ProtocolError::PayloadTooLarge {
            len: payload_len,
            max: MAX_INBOUND_PAYLOAD,
        });
    }

    let mask_key = if masked {
        if buf.len() < offset + 4 {
            return Ok(None);
        }
        let key = [buf[offset], buf[offset + 1], buf[offset + 2], buf[offset + 3]];
        offset += 4;
        Some(key)
    } else {
        None
    };

    let total = offset + payload_len as usize;
    if buf.len() < total {
        return Ok(None);
    }

    let mut payload = buf[offset..total].to_vec();
    if let Some(key) = mask_key {
        for (i, byte) in payload.iter_mut().enumerate() {
            *byte ^= key[i % 4];
        }
    }

    Ok(Some((Frame { fin, opcode, payload }, total)))
}
