//! Wire-format compatibility.
//!
//! A container is assembled here byte by byte from the NaCl primitives and
//! hand-written JSON, without touching the stream or header builders, and
//! must decrypt through the public API. The reverse direction takes a
//! library-produced container apart with the same primitives.

use peerio_core::config::StreamConfig;
use peerio_core::{Contacts, SliceBlob};
use peerio_crypto::encoding::{b64_decode, b64_decode_array, b64_encode};
use peerio_crypto::hash::blake2s_256;
use peerio_crypto::nacl::{crypto_box, crypto_box_open, scalar_base_mult, secretbox, secretbox_open};
use peerio_crypto::{decrypt_container, DecryptedMessage, Identity, KeyPair, Session};
use serde_json::{json, Value};

const ALICE_SECRET: [u8; 32] = [0x01; 32];
const BOB_SECRET: [u8; 32] = [0x02; 32];
const EPHEMERAL_SECRET: [u8; 32] = [0x05; 32];
const FILE_KEY: [u8; 32] = [0x07; 32];
const FILE_NONCE: [u8; 16] = [0x09; 16];
const BOX_NONCE: [u8; 24] = [0x03; 24];

fn identity(secret: [u8; 32], name: &str) -> Identity {
    Identity::from_key_pair(name, KeyPair::from_secret_key(secret))
}

fn wire_chunk(plaintext: &[u8], nonce: &[u8; 24]) -> Vec<u8> {
    let mut out = (plaintext.len() as u32).to_le_bytes().to_vec();
    out.extend_from_slice(&secretbox(plaintext, nonce, &FILE_KEY).unwrap());
    out
}

/// Chunk stream for `name` + `payload` in a single last chunk.
fn fixture_chunks(name: &str, payload: &[u8]) -> Vec<u8> {
    let mut nonce = [0u8; 24];
    nonce[..16].copy_from_slice(&FILE_NONCE);

    let mut name_block = [0u8; 256];
    name_block[..name.len()].copy_from_slice(name.as_bytes());
    let mut chunks = wire_chunk(&name_block, &nonce);

    nonce[16] = 1;
    nonce[23] |= 0x80;
    chunks.extend(wire_chunk(payload, &nonce));
    chunks
}

fn fixture_header(chunks: &[u8], alice: &Identity, bob: &Identity) -> Value {
    let file_info = json!({
        "fileKey": b64_encode(&FILE_KEY),
        "fileNonce": b64_encode(&FILE_NONCE),
        "fileHash": b64_encode(&blake2s_256(chunks)),
    });
    let inner = crypto_box(
        file_info.to_string().as_bytes(),
        &BOX_NONCE,
        bob.public_key(),
        &ALICE_SECRET,
    )
    .unwrap();
    let entry = json!({
        "senderID": alice.id(),
        "recipientID": bob.id(),
        "fileInfo": b64_encode(&inner),
    });
    let outer = crypto_box(
        entry.to_string().as_bytes(),
        &BOX_NONCE,
        bob.public_key(),
        &EPHEMERAL_SECRET,
    )
    .unwrap();

    json!({
        "version": 1,
        "ephemeral": b64_encode(&scalar_base_mult(&EPHEMERAL_SECRET)),
        "decryptInfo": { b64_encode(&BOX_NONCE): b64_encode(&outer) },
    })
}

#[test]
fn hand_assembled_container_decrypts() {
    let alice = identity(ALICE_SECRET, "alice");
    let bob = identity(BOB_SECRET, "bob");

    let chunks = fixture_chunks("lalala", b"[1,2,3]");
    let header = fixture_header(&chunks, &alice, &bob).to_string();

    let mut container = b"miniLock".to_vec();
    container.extend_from_slice(&(header.len() as u32).to_le_bytes());
    container.extend_from_slice(header.as_bytes());
    container.extend_from_slice(&chunks);

    let mut out = Vec::new();
    let file = decrypt_container(&mut SliceBlob::new(&container), &bob, &mut out).unwrap();
    assert_eq!(file.file_name, "lalala");
    assert_eq!(file.sender_id, alice.id());
    assert_eq!(out, b"[1,2,3]");
}

#[test]
fn hand_assembled_message_decrypts() {
    let alice = identity(ALICE_SECRET, "alice");
    let bob = identity(BOB_SECRET, "bob");

    let chunks = fixture_chunks("message", br#"{"text":"lalala","ids":[1,2,3]}"#);
    let header = serde_json::from_value(fixture_header(&chunks, &alice, &bob)).unwrap();

    let session = Session::new(bob, Contacts::new(), &StreamConfig::default());
    let got: DecryptedMessage<Value> = session
        .decrypt_message(&header, &b64_encode(&chunks))
        .unwrap();
    assert_eq!(got.message, json!({"text": "lalala", "ids": [1, 2, 3]}));
    assert_eq!(got.sender_id, alice.id());
}

#[test]
fn library_container_opens_with_primitives() {
    let alice = identity(ALICE_SECRET, "alice");
    let bob = identity(BOB_SECRET, "bob");
    let mut contacts = Contacts::new();
    contacts.insert("bob", bob.id());
    let session = Session::new(alice.clone(), contacts, &StreamConfig::default());

    let mut container = Vec::new();
    session
        .encrypt_file(&mut SliceBlob::new(b"payload"), "lalala", &["bob"], &mut container)
        .unwrap();

    assert_eq!(&container[..8], b"miniLock");
    let header_len = u32::from_le_bytes(container[8..12].try_into().unwrap()) as usize;
    let header: Value = serde_json::from_slice(&container[12..12 + header_len]).unwrap();
    let chunks = &container[12 + header_len..];
    assert_eq!(header["version"], 1);

    let ephemeral: [u8; 32] = b64_decode_array(header["ephemeral"].as_str().unwrap()).unwrap();
    let entries = header["decryptInfo"].as_object().unwrap();
    assert_eq!(entries.len(), 2);

    // Find bob's entry the way any reader must: by trying each one.
    let entry: Value = entries
        .iter()
        .find_map(|(nonce, sealed)| {
            let nonce: [u8; 24] = b64_decode_array(nonce).ok()?;
            let sealed = b64_decode(sealed.as_str()?).ok()?;
            let opened = crypto_box_open(&sealed, &nonce, &ephemeral, &BOB_SECRET)?;
            let mut entry: Value = serde_json::from_slice(&opened).ok()?;
            entry["nonce"] = json!(b64_encode(&nonce));
            Some(entry)
        })
        .unwrap();
    assert_eq!(entry["senderID"], alice.id());
    assert_eq!(entry["recipientID"], bob.id());

    let nonce: [u8; 24] = b64_decode_array(entry["nonce"].as_str().unwrap()).unwrap();
    let inner = b64_decode(entry["fileInfo"].as_str().unwrap()).unwrap();
    let file_info: Value = serde_json::from_slice(
        &crypto_box_open(&inner, &nonce, alice.public_key(), &BOB_SECRET).unwrap(),
    )
    .unwrap();

    let file_key: [u8; 32] = b64_decode_array(file_info["fileKey"].as_str().unwrap()).unwrap();
    let file_nonce: [u8; 16] = b64_decode_array(file_info["fileNonce"].as_str().unwrap()).unwrap();
    let file_hash: [u8; 32] = b64_decode_array(file_info["fileHash"].as_str().unwrap()).unwrap();
    assert_eq!(blake2s_256(chunks), file_hash);

    // Walk the two chunks by hand: name, then the single last payload chunk.
    let mut full_nonce = [0u8; 24];
    full_nonce[..16].copy_from_slice(&file_nonce);
    let name_len = u32::from_le_bytes(chunks[..4].try_into().unwrap()) as usize;
    assert_eq!(name_len, 256);
    let name = secretbox_open(&chunks[4..4 + 16 + name_len], &full_nonce, &file_key).unwrap();
    assert_eq!(&name[..6], b"lalala");
    assert!(name[6..].iter().all(|&b| b == 0));

    let rest = &chunks[4 + 16 + name_len..];
    full_nonce[16] = 1;
    full_nonce[23] |= 0x80;
    assert_eq!(u32::from_le_bytes(rest[..4].try_into().unwrap()), 7);
    assert_eq!(secretbox_open(&rest[4..], &full_nonce, &file_key).unwrap(), b"payload");
}
