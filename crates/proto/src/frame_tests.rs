// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use bytes::Bytes;

use crate::frame::{
    encode, encode_raw, CmdId, Frame, FrameDecoder, FrameError, HEADER_LEN, MAX_BODY_LEN,
};

#[test]
fn encode_layout_is_bit_exact() {
    let frame = encode(CmdId::HeartbeatReq, b"ab");
    assert_eq!(&frame[0..2], b"IM");
    assert_eq!(frame[2], 1);
    assert_eq!(&frame[3..5], &[0x10, 0x03]); // cmd_id big-endian
    assert_eq!(&frame[5..9], &[0, 0, 0, 2]); // body_length big-endian
    assert_eq!(&frame[9..], b"ab");
    assert_eq!(frame.len(), HEADER_LEN + 2);
}

#[test]
fn decode_roundtrip() -> anyhow::Result<()> {
    let mut dec = FrameDecoder::new();
    dec.extend(&encode(CmdId::MsgSendReq, b"hello"));

    let frame = dec.next_frame()?;
    assert_eq!(
        frame,
        Some(Frame { cmd_id: CmdId::MsgSendReq.as_u16(), body: Bytes::from_static(b"hello") })
    );
    assert_eq!(dec.next_frame()?, None);
    assert_eq!(dec.pending(), 0);
    Ok(())
}

#[test]
fn short_reads_keep_bytes_for_the_next_round() -> anyhow::Result<()> {
    let encoded = encode(CmdId::MsgSyncReq, b"0123456789");
    let mut dec = FrameDecoder::new();

    // Feed one byte at a time; the frame must pop only once it is whole.
    for (i, byte) in encoded.iter().enumerate() {
        dec.extend(&[*byte]);
        let got = dec.next_frame()?;
        if i + 1 < encoded.len() {
            assert_eq!(got, None, "frame completed early at byte {i}");
        } else {
            assert_eq!(got.map(|f| f.cmd_id), Some(CmdId::MsgSyncReq.as_u16()));
        }
    }
    Ok(())
}

#[test]
fn multiple_frames_in_one_feed_pop_in_order() -> anyhow::Result<()> {
    let mut dec = FrameDecoder::new();
    let mut joined = Vec::new();
    joined.extend_from_slice(&encode(CmdId::HeartbeatReq, b""));
    joined.extend_from_slice(&encode(CmdId::MsgSendReq, b"one"));
    joined.extend_from_slice(&encode(CmdId::MsgSyncReq, b"two"));
    dec.extend(&joined);

    let cmds: Vec<u16> = std::iter::from_fn(|| dec.next_frame().ok().flatten())
        .map(|f| f.cmd_id)
        .collect();
    assert_eq!(
        cmds,
        vec![
            CmdId::HeartbeatReq.as_u16(),
            CmdId::MsgSendReq.as_u16(),
            CmdId::MsgSyncReq.as_u16()
        ]
    );
    Ok(())
}

#[test]
fn magic_mismatch_is_fatal() {
    let mut dec = FrameDecoder::new();
    dec.extend(b"XX\x01\x10\x01\x00\x00\x00\x00");
    assert_eq!(dec.next_frame(), Err(FrameError::BadMagic));
}

#[test]
fn version_mismatch_is_fatal() {
    let mut dec = FrameDecoder::new();
    dec.extend(b"IM\x02\x10\x01\x00\x00\x00\x00");
    assert_eq!(dec.next_frame(), Err(FrameError::BadVersion(2)));
}

#[test]
fn oversize_body_is_fatal_before_buffering() {
    let mut dec = FrameDecoder::new();
    let len = (MAX_BODY_LEN as u32) + 1;
    let mut header = Vec::new();
    header.extend_from_slice(b"IM\x01\x20\x01");
    header.extend_from_slice(&len.to_be_bytes());
    dec.extend(&header);
    assert_eq!(dec.next_frame(), Err(FrameError::Oversize(len)));
}

#[test]
fn unknown_cmd_id_still_decodes() -> anyhow::Result<()> {
    // The codec is agnostic; dispatch decides what to do with 0x9999.
    let mut dec = FrameDecoder::new();
    dec.extend(&encode_raw(0x9999, b"?"));
    let frame = dec.next_frame()?;
    assert_eq!(frame.map(|f| f.cmd_id), Some(0x9999));
    Ok(())
}

#[yare::parameterized(
    login     = { CmdId::LoginReq, Some(CmdId::LoginResp) },
    heartbeat = { CmdId::HeartbeatReq, Some(CmdId::HeartbeatResp) },
    logout    = { CmdId::LogoutReq, Some(CmdId::LogoutResp) },
    send      = { CmdId::MsgSendReq, Some(CmdId::MsgSendResp) },
    sync      = { CmdId::MsgSyncReq, Some(CmdId::MsgSyncResp) },
    group_acc = { CmdId::GroupAcceptReq, Some(CmdId::GroupAcceptResp) },
    push      = { CmdId::MsgPushNotify, None },
    resp      = { CmdId::LoginResp, None },
)]
fn request_response_pairing(cmd: CmdId, expected: Option<CmdId>) {
    assert_eq!(cmd.response(), expected);
}

#[test]
fn cmd_id_u16_roundtrip() {
    for raw in [0x1001, 0x1006, 0x2003, 0x3005, 0x4009, 0x4010] {
        let cmd = CmdId::from_u16(raw);
        assert_eq!(cmd.map(|c| c.as_u16()), Some(raw));
    }
    assert_eq!(CmdId::from_u16(0x400A), None);
    assert_eq!(CmdId::from_u16(0), None);
}
