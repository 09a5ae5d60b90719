mod common;

use std::net::TcpListener;
use std::time::Duration;

use futures::future::join_all;
use registry_operator_metrics::config::TlsConfig;
use registry_operator_metrics::error::ServerError;
use registry_operator_metrics::metrics::{
    Metrics, MetricsRecorder, IMAGE_PRUNER_INSTALL_STATUS, STORAGE_RECONFIGURED_TOTAL,
};
use registry_operator_metrics::routes::EXPOSITION_CONTENT_TYPE;
use registry_operator_metrics::startup::Server;
use registry_operator_metrics::tls::{install_crypto_provider, TlsMaterial};

fn insecure_http_client() -> reqwest::Client {
    install_crypto_provider();
    reqwest::Client::builder()
        .use_rustls_tls()
        .danger_accept_invalid_certs(true)
        .build()
        .expect("client should build")
}

#[tokio::test]
async fn serves_metrics_over_tls() {
    let addr = common::spawn_server(&common::load_test_config(), Metrics::new().unwrap()).await;

    let response = insecure_http_client()
        .get(common::metrics_url(addr))
        .send()
        .await
        .expect("error requesting metrics server");

    assert_eq!(response.status(), reqwest::StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .unwrap(),
        EXPOSITION_CONTENT_TYPE
    );
}

#[tokio::test]
async fn storage_reconfigured_accumulates_across_scrapes() {
    let metrics = Metrics::new().unwrap();
    let addr = common::spawn_server(&common::load_test_config(), metrics.clone()).await;
    let client = common::insecure_client(addr);

    for (name, iterations, expected) in [
        ("zeroed", 0, 0.0),
        ("increase to five", 5, 5.0),
        ("increase to ten", 5, 10.0),
    ] {
        for _ in 0..iterations {
            metrics.storage_reconfigured();
        }

        let family = client
            .find(STORAGE_RECONFIGURED_TOTAL)
            .await
            .expect("scrape should succeed")
            .unwrap_or_else(|| panic!("{name}: unable to locate metric"));

        let value = family.samples[0].value;
        assert_eq!(value, expected, "{name}: expected {expected}, found {value}");
    }
}

#[tokio::test]
async fn image_pruner_install_status() {
    let metrics = Metrics::new().unwrap();
    let addr = common::spawn_server(&common::load_test_config(), metrics.clone()).await;
    let client = common::insecure_client(addr);

    for (name, installed, enabled, expected) in [
        ("not installed", false, false, 0.0),
        ("suspended", true, false, 1.0),
        ("enabled", true, true, 2.0),
    ] {
        metrics.image_pruner_install_status(installed, enabled);

        let family = client
            .find(IMAGE_PRUNER_INSTALL_STATUS)
            .await
            .expect("scrape should succeed")
            .unwrap_or_else(|| panic!("{name}: unable to locate metric"));

        assert!(!family.samples.is_empty());
        for sample in &family.samples {
            assert_eq!(sample.value, expected, "{name}");
        }
    }
}

#[tokio::test]
async fn unknown_metric_is_absent_not_an_error() {
    let addr = common::spawn_server(&common::load_test_config(), Metrics::new().unwrap()).await;

    let family = common::insecure_client(addr)
        .find("image_registry_operator_does_not_exist")
        .await
        .expect("scrape should succeed");

    assert!(family.is_none());
}

#[tokio::test]
async fn plaintext_request_is_refused() {
    let addr = common::spawn_server(&common::load_test_config(), Metrics::new().unwrap()).await;

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
        .expect("client should build");
    let result = client
        .get(format!("http://{}/metrics", addr))
        .send()
        .await;

    assert!(result.is_err(), "plaintext request should not get a response");
}

#[tokio::test]
async fn unknown_path_is_not_found_over_tls() {
    let addr = common::spawn_server(&common::load_test_config(), Metrics::new().unwrap()).await;

    let response = insecure_http_client()
        .get(format!("https://{}/other", addr))
        .send()
        .await
        .expect("request should complete");

    assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn concurrent_increments_are_all_exposed() {
    let metrics = Metrics::new().unwrap();
    let addr = common::spawn_server(&common::load_test_config(), metrics.clone()).await;
    let client = common::insecure_client(addr);

    let writers: Vec<_> = (0..10)
        .map(|_| {
            let metrics = metrics.clone();
            tokio::spawn(async move {
                for _ in 0..100 {
                    metrics.storage_reconfigured();
                    tokio::task::yield_now().await;
                }
            })
        })
        .collect();
    // Scrape while the writers run; values must parse mid-update.
    let readers: Vec<_> = (0..5)
        .map(|_| {
            let client = client.clone();
            tokio::spawn(async move { client.find(STORAGE_RECONFIGURED_TOTAL).await })
        })
        .collect();

    for joined in join_all(writers).await {
        joined.expect("writer task panicked");
    }
    for joined in join_all(readers).await {
        let family = joined
            .expect("reader task panicked")
            .expect("scrape should succeed")
            .expect("metric should be exposed");
        assert!(family.samples[0].value <= 1000.0);
    }

    let family = client
        .find(STORAGE_RECONFIGURED_TOTAL)
        .await
        .expect("scrape should succeed")
        .expect("metric should be exposed");
    assert_eq!(family.samples[0].value, 1000.0);
}

#[tokio::test]
async fn loads_certificate_from_files() {
    let material = TlsMaterial::self_signed(&["localhost".to_string()]).unwrap();
    let dir = std::env::temp_dir();
    let cert_path = dir.join(format!("testcert-{}.pem", uuid::Uuid::new_v4()));
    let key_path = dir.join(format!("testkey-{}.pem", uuid::Uuid::new_v4()));
    std::fs::write(&cert_path, &material.cert_pem).unwrap();
    std::fs::write(&key_path, &material.key_pem).unwrap();

    let mut config = common::load_test_config();
    config.tls = TlsConfig::Files {
        cert_path: cert_path.clone(),
        key_path: key_path.clone(),
    };
    let addr = common::spawn_server(&config, Metrics::new().unwrap()).await;

    let families = common::insecure_client(addr).scrape().await;

    std::fs::remove_file(&cert_path).unwrap();
    std::fs::remove_file(&key_path).unwrap();
    assert!(!families.expect("scrape should succeed").is_empty());
}

#[tokio::test]
async fn missing_certificate_fails_startup() {
    let mut config = common::load_test_config();
    config.tls = TlsConfig::Files {
        cert_path: "/nonexistent/tls.crt".into(),
        key_path: "/nonexistent/tls.key".into(),
    };

    match Server::bind(&config, Metrics::new().unwrap()).await {
        Err(ServerError::Tls(_)) => {}
        Err(other) => panic!("expected a TLS error, got {other}"),
        Ok(_) => panic!("server should not start without a certificate"),
    }
}

#[tokio::test]
async fn occupied_port_fails_startup() {
    let occupied = TcpListener::bind("127.0.0.1:0").unwrap();
    let mut config = common::load_test_config();
    config.server.port = occupied.local_addr().unwrap().port();

    match Server::bind(&config, Metrics::new().unwrap()).await {
        Err(ServerError::Bind { address, .. }) => {
            assert_eq!(address, config.server.bind_address());
        }
        Err(other) => panic!("expected a bind error, got {other}"),
        Ok(_) => panic!("server should not bind an occupied port"),
    }
}
