use mumblet::proto::ChannelState;
use mumblet::{
    FrameError, Message, MessageFramer, MessageKind, MAX_MESSAGE_SIZE, PREFIX_SIZE,
};
use tokio::io::{duplex, AsyncWriteExt};

fn sample_message() -> Message {
    let state = ChannelState {
        channel_id: Some(1),
        parent: Some(0),
        name: Some("Lobby".to_string()),
        ..Default::default()
    };
    Message::new(MessageKind::ChannelState, state.encode())
}

#[tokio::test]
async fn single_byte_chunks_reassemble_the_same_message() {
    let message = sample_message();
    let bytes = message.to_bytes();

    let (mut tx, mut rx) = duplex(8);
    let writer = tokio::spawn(async move {
        for byte in bytes {
            tx.write_all(&[byte]).await.unwrap();
            tx.flush().await.unwrap();
        }
        tx
    });

    let mut framer = MessageFramer::new();
    let received = framer.read_message(&mut rx).await.unwrap();
    assert_eq!(received, message);
    writer.await.unwrap();
}

#[tokio::test]
async fn one_framer_handles_many_messages_serially() {
    let first = sample_message();
    let second = Message::new(MessageKind::Ping, Vec::new());
    let third = Message::new(MessageKind::TextMessage, vec![0xaa; 17]);

    let mut stream_bytes = first.to_bytes();
    stream_bytes.extend_from_slice(&second.to_bytes());
    stream_bytes.extend_from_slice(&third.to_bytes());

    // Split at an awkward boundary: mid-prefix of the third message.
    let cut = first.to_bytes().len() + second.to_bytes().len() + 2;
    let (head, tail) = stream_bytes.split_at(cut);
    let (head, tail) = (head.to_vec(), tail.to_vec());

    let (mut tx, mut rx) = duplex(4096);
    let writer = tokio::spawn(async move {
        tx.write_all(&head).await.unwrap();
        tx.flush().await.unwrap();
        tokio::task::yield_now().await;
        tx.write_all(&tail).await.unwrap();
        tx
    });

    let mut framer = MessageFramer::new();
    assert_eq!(framer.read_message(&mut rx).await.unwrap(), first);
    assert_eq!(framer.read_message(&mut rx).await.unwrap(), second);
    assert_eq!(framer.read_message(&mut rx).await.unwrap(), third);
    writer.await.unwrap();
}

#[tokio::test]
async fn ping_prefix_in_two_halves_yields_one_empty_message() {
    let bytes = [0x00, 0x03, 0x00, 0x00, 0x00, 0x00];
    let (mut tx, mut rx) = duplex(16);

    tx.write_all(&bytes[..3]).await.unwrap();
    let writer = tokio::spawn(async move {
        tokio::task::yield_now().await;
        tx.write_all(&bytes[3..]).await.unwrap();
        tx
    });

    let mut framer = MessageFramer::new();
    let message = framer.read_message(&mut rx).await.unwrap();
    assert_eq!(message.kind, MessageKind::Ping);
    assert!(message.payload.is_empty());
    writer.await.unwrap();
}

#[tokio::test]
async fn zero_length_payload_is_legal() {
    let (mut tx, mut rx) = duplex(64);
    Message::new(MessageKind::Ping, Vec::new())
        .write_to(&mut tx)
        .await
        .unwrap();

    let mut framer = MessageFramer::new();
    let message = framer.read_message(&mut rx).await.unwrap();
    assert_eq!(message, Message::new(MessageKind::Ping, Vec::new()));
}

#[tokio::test]
async fn oversized_declaration_fails_without_reading_the_payload() {
    let (mut tx, mut rx) = duplex(64);
    let declared = (MAX_MESSAGE_SIZE - PREFIX_SIZE + 1) as u32;
    let mut prefix = vec![0x00, 0x07];
    prefix.extend_from_slice(&declared.to_be_bytes());
    tx.write_all(&prefix).await.unwrap();

    let mut framer = MessageFramer::new();
    let err = framer.read_message(&mut rx).await.unwrap_err();
    match err {
        FrameError::MessageTooLarge { declared, limit } => {
            assert_eq!(declared, MAX_MESSAGE_SIZE + 1);
            assert_eq!(limit, MAX_MESSAGE_SIZE);
        }
        other => panic!("expected MessageTooLarge, got {other:?}"),
    }
}

#[tokio::test]
async fn stream_closing_mid_message_is_connection_closed() {
    let (mut tx, mut rx) = duplex(64);
    let bytes = sample_message().to_bytes();
    tx.write_all(&bytes[..4]).await.unwrap();
    drop(tx);

    let mut framer = MessageFramer::new();
    let err = framer.read_message(&mut rx).await.unwrap_err();
    assert!(matches!(err, FrameError::ConnectionClosed));
}

#[tokio::test]
async fn unknown_type_ids_pass_through_the_framer() {
    let (mut tx, mut rx) = duplex(64);
    let message = Message::new(MessageKind::Unknown(199), vec![1, 2, 3]);
    message.write_to(&mut tx).await.unwrap();

    let mut framer = MessageFramer::new();
    let received = framer.read_message(&mut rx).await.unwrap();
    assert_eq!(received.kind, MessageKind::Unknown(199));
    assert_eq!(received.payload, vec![1, 2, 3]);
}

#[tokio::test]
async fn write_then_read_reproduces_type_and_payload_exactly() {
    let (mut tx, mut rx) = duplex(4096);
    let messages = vec![
        sample_message(),
        Message::new(MessageKind::Version, vec![0x08, 0x01]),
        Message::new(MessageKind::Ping, Vec::new()),
    ];
    for message in &messages {
        message.write_to(&mut tx).await.unwrap();
    }

    let mut framer = MessageFramer::new();
    for expected in &messages {
        let received = framer.read_message(&mut rx).await.unwrap();
        assert_eq!(&received, expected);
    }
}
