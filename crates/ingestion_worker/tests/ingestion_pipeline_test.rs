use common::crypto::{SealedBoxDecryptor, SealedBoxSealer, ServerSecret};
use common::{
    encode_reading, EncryptedEnvelope, MockMetricsRecorder, Reading, LDR_INSTRUMENT,
    PIR_INSTRUMENT,
};
use ingestion_worker::{seal_reading, ReadingIngestionService};
use realtime_hub::{Hub, HubHandle, Payload, SessionId};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

const SERVER_KEY_HEX: &str = "4174bee44869f6672f32daed3ca7dd10b8a8141813df58ebfc00dda0563cfbc1";

fn reading() -> Reading {
    Reading {
        device_id: "dev-1".to_string(),
        timestamp_ms: 1000,
        illumination: 42,
        motion_detected: false,
    }
}

fn spawn_hub(token: &CancellationToken) -> HubHandle {
    let (mut hub, handle) = Hub::new(16);
    let hub_token = token.clone();
    tokio::spawn(async move { hub.run(hub_token).await });
    handle
}

async fn subscribe(handle: &HubHandle) -> mpsc::Receiver<Payload> {
    let (tx, rx) = mpsc::channel(8);
    handle.register(SessionId::next(), tx);
    assert_eq!(handle.subscriber_count().await.unwrap(), 1);
    rx
}

fn expect_gauges(metrics: &mut MockMetricsRecorder, ldr: i64, pir: i64) {
    metrics
        .expect_record_gauge()
        .withf(move |instrument: &str, value: &i64| instrument == LDR_INSTRUMENT && *value == ldr)
        .times(1)
        .return_const(());
    metrics
        .expect_record_gauge()
        .withf(move |instrument: &str, value: &i64| instrument == PIR_INSTRUMENT && *value == pir)
        .times(1)
        .return_const(());
}

#[tokio::test]
async fn test_sealed_reading_reaches_subscriber() {
    let secret = ServerSecret::from_hex(SERVER_KEY_HEX).unwrap();
    let sealer = SealedBoxSealer::new(secret.public_key());
    let token = CancellationToken::new();
    let handle = spawn_hub(&token);
    let mut subscriber = subscribe(&handle).await;

    let mut metrics = MockMetricsRecorder::new();
    expect_gauges(&mut metrics, 42, 0);

    let service = ReadingIngestionService::new(
        Arc::new(SealedBoxDecryptor::new(secret)),
        Arc::new(metrics),
        Arc::new(handle.clone()),
    );

    let payload = seal_reading(&sealer, &reading()).unwrap();
    let ingested = service.process(&payload).await.unwrap();
    assert_eq!(ingested, reading());

    let delivered = subscriber.recv().await.unwrap();
    assert_eq!(delivered.as_str(), encode_reading(&reading()).unwrap());
    assert_eq!(
        delivered.as_str(),
        r#"{"device_id":"dev-1","timestamp_ms":1000,"ldr":42,"pir":false}"#
    );

    // exactly one payload per reading
    assert!(
        tokio::time::timeout(Duration::from_millis(100), subscriber.recv())
            .await
            .is_err()
    );

    token.cancel();
}

#[tokio::test]
async fn test_tampered_envelope_is_dropped_and_next_succeeds() {
    let secret = ServerSecret::from_hex(SERVER_KEY_HEX).unwrap();
    let sealer = SealedBoxSealer::new(secret.public_key());
    let token = CancellationToken::new();
    let handle = spawn_hub(&token);
    let mut subscriber = subscribe(&handle).await;

    // gauges only for the valid message
    let mut metrics = MockMetricsRecorder::new();
    expect_gauges(&mut metrics, 42, 0);

    let service = ReadingIngestionService::new(
        Arc::new(SealedBoxDecryptor::new(secret)),
        Arc::new(metrics),
        Arc::new(handle.clone()),
    );

    let payload = seal_reading(&sealer, &reading()).unwrap();
    let mut tampered: EncryptedEnvelope = serde_json::from_slice(&payload).unwrap();
    // swap in a nonce from a different envelope
    let other: EncryptedEnvelope =
        serde_json::from_slice(&seal_reading(&sealer, &reading()).unwrap()).unwrap();
    tampered.nonce = other.nonce;
    let tampered = serde_json::to_vec(&tampered).unwrap();

    service.handle_message("esp32/kriptografi/encrypted/ldr-pir", &tampered).await;
    assert!(subscriber.try_recv().is_err());

    service.handle_message("esp32/kriptografi/encrypted/ldr-pir", &payload).await;
    let delivered = subscriber.recv().await.unwrap();
    assert_eq!(delivered.as_str(), encode_reading(&reading()).unwrap());

    token.cancel();
}

#[tokio::test]
async fn test_reading_for_other_server_is_rejected() {
    let other_server = ServerSecret::from_bytes([3u8; 32]);
    let sealer = SealedBoxSealer::new(other_server.public_key());
    let token = CancellationToken::new();
    let handle = spawn_hub(&token);
    let mut subscriber = subscribe(&handle).await;

    let mut metrics = MockMetricsRecorder::new();
    metrics.expect_record_gauge().times(0);

    let service = ReadingIngestionService::new(
        Arc::new(SealedBoxDecryptor::new(
            ServerSecret::from_hex(SERVER_KEY_HEX).unwrap(),
        )),
        Arc::new(metrics),
        Arc::new(handle.clone()),
    );

    let payload = seal_reading(&sealer, &reading()).unwrap();
    assert!(service.process(&payload).await.is_err());
    assert!(subscriber.try_recv().is_err());

    token.cancel();
}
