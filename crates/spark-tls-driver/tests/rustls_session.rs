//! 以 `rustls` 为真实引擎的端到端测试。
//!
//! # 教案级注释概览
//!
//! - **核心目标 (Why)**：回环引擎只能证明编排逻辑自洽；这里用真实 TLS 1.3 会话验证适配器的
//!   溢出保留、证书校验错误映射与 close-notify 交换。
//! - **结构说明 (How)**：`rcgen` 现场签发自签名证书，客户端只信任该证书；两端均为内存管道连接，
//!   由 `connect_memory_pair`/`shuttle` 搬运密文。
//! - **合同与边界 (What)**：握手完成后协议版本为 `TLSv1.3`；信任库为空时握手以
//!   `CertificateVerification` 失败，且失败前已向对端发出告警。

use std::sync::{Arc, Once};

use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName};
use rustls::{ClientConfig, RootCertStore, ServerConfig};
use spark_tls_driver::testing::{connect_memory_pair, shuttle};
use spark_tls_driver::{RustlsEngine, TlsConnection, TlsError};

const HOST: &str = "localhost";

fn ensure_crypto_provider() {
    static INSTALL: Once = Once::new();
    INSTALL.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

/// 签发自签名证书，返回服务端配置与证书 DER。
fn server_config() -> (Arc<ServerConfig>, Vec<u8>) {
    ensure_crypto_provider();
    let mut params = CertificateParams::new(vec![HOST.to_string()]).expect("构造证书参数失败");
    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, HOST);
    params.distinguished_name = dn;

    let key_pair = KeyPair::generate().expect("生成证书私钥失败");
    let certificate = params.self_signed(&key_pair).expect("签发自签名证书失败");
    let cert_der = certificate.der().to_vec();
    let private_key = PrivateKeyDer::try_from(key_pair.serialize_der()).expect("解析私钥失败");

    let config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(vec![CertificateDer::from(cert_der.clone())], private_key)
        .expect("构建服务端 TLS 配置失败");
    (Arc::new(config), cert_der)
}

fn client_config(trusted: Option<&[u8]>) -> Arc<ClientConfig> {
    ensure_crypto_provider();
    let mut roots = RootCertStore::empty();
    if let Some(certificate) = trusted {
        roots
            .add(CertificateDer::from(certificate.to_vec()))
            .expect("将证书写入 Root Store 失败");
    }
    Arc::new(
        ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth(),
    )
}

fn engines(trust_server: bool) -> (RustlsEngine, RustlsEngine) {
    let (server_config, cert_der) = server_config();
    let trusted = trust_server.then_some(cert_der.as_slice());
    let name = ServerName::try_from(HOST).expect("合法的主机名");
    let client = RustlsEngine::client(client_config(trusted), name).expect("创建客户端引擎");
    let server = RustlsEngine::server(server_config).expect("创建服务端引擎");
    (client, server)
}

fn established() -> (TlsConnection<RustlsEngine>, TlsConnection<RustlsEngine>) {
    let (client, server) = engines(true);
    connect_memory_pair(client, server).expect("rustls 握手应完成")
}

/// 读出恰好 `expected` 字节。
fn read_exact(conn: &mut TlsConnection<RustlsEngine>, expected: usize, dest_len: usize) -> Vec<u8> {
    let mut collected = Vec::with_capacity(expected);
    let mut dest = vec![0u8; dest_len];
    while collected.len() < expected {
        let read = conn.read(&mut dest).expect("缓冲中应有完整记录");
        assert!(read > 0);
        collected.extend_from_slice(&dest[..read]);
    }
    collected
}

#[test]
fn handshake_negotiates_tls13() {
    let (client, server) = established();
    assert_eq!(client.protocol_version(), Some("TLSv1.3"));
    assert_eq!(server.protocol_version(), Some("TLSv1.3"));
    assert!(server.is_server());
    assert!(!client.is_server());
    assert_eq!(client.alpn_protocol(), None);
    assert!(matches!(client.engine().connection(), rustls::Connection::Client(_)));
    assert!(matches!(server.engine().connection(), rustls::Connection::Server(_)));
}

#[test]
fn application_data_round_trips_both_ways() {
    let (mut client, mut server) = established();
    let request: Vec<u8> = (0..256 * 1024).map(|i| (i % 253) as u8).collect();
    assert_eq!(client.write(&request).expect("客户端写入"), request.len());
    shuttle(&mut client, &mut server);
    assert_eq!(read_exact(&mut server, request.len(), 32 * 1024), request);

    server.write(b"pong").expect("服务端写入");
    shuttle(&mut server, &mut client);
    assert_eq!(read_exact(&mut client, 4, 64), b"pong");
}

#[test]
fn small_destination_keeps_the_rest_of_the_record() {
    let (mut client, mut server) = established();
    let message = [7u8; 100];
    client.write(&message).expect("客户端写入");
    shuttle(&mut client, &mut server);

    let mut small = [0u8; 10];
    assert_eq!(server.read(&mut small).expect("首次小缓冲读取"), 10);
    assert_eq!(server.pending(), 90);
    assert_eq!(read_exact(&mut server, 90, 10), vec![7u8; 90]);
    assert_eq!(server.pending(), 0);
}

#[test]
fn untrusted_certificate_fails_verification() {
    let (client, server) = engines(false);
    let error = connect_memory_pair(client, server).expect_err("空信任库应拒绝自签名证书");
    assert!(matches!(error, TlsError::CertificateVerification(_)), "实际错误: {error:?}");
    assert_eq!(error.code(), "spark.tls.certificate_verify_failed");
}

#[test]
fn clean_shutdown_exchanges_close_notify() {
    let (mut client, mut server) = established();
    assert!(matches!(client.shutdown(), Err(TlsError::WantRead)));
    shuttle(&mut client, &mut server);

    let mut buf = [0u8; 16];
    assert_eq!(server.read(&mut buf).expect("服务端读到 close-notify"), 0);
    assert_eq!(server.read(&mut buf).expect("重复读取"), 0);
    shuttle(&mut server, &mut client);

    client.shutdown().expect("客户端关闭握手应完成");
    assert!(matches!(client.write(b"late"), Err(TlsError::SessionClosed)));
}
