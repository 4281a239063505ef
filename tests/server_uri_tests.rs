use librascli::ServerUri;
use tokio::test;

/// Test parsing a complete ws URL
#[test]
async fn test_parse_complete_url() {
    let uri = ServerUri::parse("ws://example.com:8080/path").unwrap();

    assert_eq!(uri.host, "example.com");
    assert_eq!(uri.port, Some(8080));
    assert_eq!(uri.path, Some("/path".to_string()));
}

/// Test parsing a simple host-only address
#[test]
async fn test_parse_host_only() {
    let uri = ServerUri::parse("example.com").unwrap();

    assert_eq!(uri.host, "example.com");
    assert_eq!(uri.port, None);
    assert_eq!(uri.path, None);
}

/// Test parsing a host with port
#[test]
async fn test_parse_host_port() {
    let uri = ServerUri::parse("127.0.0.1:8765").unwrap();

    assert_eq!(uri.host, "127.0.0.1");
    assert_eq!(uri.port, Some(8765));
    assert_eq!(uri.path, None);
}

/// Test parsing a bare address with a path
#[test]
async fn test_parse_bare_with_path() {
    let uri = ServerUri::parse("localhost:9000/data").unwrap();

    assert_eq!(uri.host, "localhost");
    assert_eq!(uri.port, Some(9000));
    assert_eq!(uri.path, Some("/data".to_string()));

    // A lone slash is no path
    let uri = ServerUri::parse("ws://localhost/").unwrap();
    assert_eq!(uri.path, None);
}

/// Test that surrounding whitespace is ignored
#[test]
async fn test_parse_trims_input() {
    let uri = ServerUri::parse("  localhost:8765 \n").unwrap();

    assert_eq!(uri.host, "localhost");
    assert_eq!(uri.port, Some(8765));
}

/// Test parsing invalid addresses
#[test]
async fn test_parse_invalid() {
    // Empty input
    assert!(ServerUri::parse("").is_err());
    assert!(ServerUri::parse("   ").is_err());

    // Port out of range or not numeric
    assert!(ServerUri::parse("localhost:99999").is_err());
    assert!(ServerUri::parse("localhost:abc").is_err());

    // Missing host
    assert!(ServerUri::parse(":8765").is_err());

    // Unsupported schemes
    assert!(ServerUri::parse("http://localhost:8765").is_err());
    assert!(ServerUri::parse("wss://localhost:8765").is_err());
}

/// Test building the connection URL
#[test]
async fn test_to_url() {
    let uri = ServerUri::parse("example.com").unwrap();
    assert_eq!(uri.to_url(8765).unwrap().as_str(), "ws://example.com:8765/");

    let uri = ServerUri::parse("example.com:1234/feed").unwrap();
    assert_eq!(uri.to_url(8765).unwrap().as_str(), "ws://example.com:1234/feed");
}

/// Test display formatting and FromStr
#[test]
async fn test_display_round_trip() {
    let uri: ServerUri = "example.com:1234/feed".parse().unwrap();
    assert_eq!(uri.to_string(), "ws://example.com:1234/feed");

    let reparsed: ServerUri = uri.to_string().parse().unwrap();
    assert_eq!(reparsed, uri);

    let uri: ServerUri = "example.com".parse().unwrap();
    assert_eq!(uri.to_string(), "ws://example.com");
}
