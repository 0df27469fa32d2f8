//! End-to-end behavior of the cache handle on a real filesystem.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use maws_cache::keys;
use maws_cache::{CacheConfig, CredentialCache, CredentialsFile, IdToken, RoleMap, StsCredentials};
use serde_json::json;
use std::fs;
use tempfile::TempDir;

const ROLE_ARN: &str = "arn:aws:iam::111122223333:role/Example";
const ISSUER: &str = "https://auth.example.com/";
const CLIENT_ID: &str = "maws-client";
const ROLES_URL: &str = "https://roles-and-aliases.example.com/roles";

const SECRET: &[u8] = b"integration-test-hs256-secret-32b";

fn jwks() -> JwkSet {
    serde_json::from_value(json!({
        "keys": [{"kty": "oct", "kid": "k1", "alg": "HS256", "k": URL_SAFE_NO_PAD.encode(SECRET)}]
    }))
    .unwrap()
}

fn sign(aud: &str, exp: i64, secret: &[u8]) -> IdToken {
    let mut header = Header::new(Algorithm::HS256);
    header.kid = Some("k1".to_string());
    let jwt = encode(
        &header,
        &json!({"iss": ISSUER, "aud": aud, "exp": exp, "sub": "ad|Mozilla-LDAP|user"}),
        &EncodingKey::from_secret(secret),
    )
    .unwrap();

    let mut token = IdToken::new(jwt);
    token.extra.insert("access_token".into(), json!("opaque-access"));
    token.extra.insert("expires_in".into(), json!(900));
    token
}

fn setup() -> (TempDir, CacheConfig) {
    let temp = TempDir::new().unwrap();
    let config = CacheConfig::with_root(temp.path().join(".maws"));
    (temp, config)
}

fn far_future() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2099, 1, 1, 0, 0, 0).unwrap()
}

fn fixed(now: DateTime<Utc>) -> impl Fn() -> DateTime<Utc> + Send + Sync + 'static {
    move || now
}

#[test]
fn sts_credentials_round_trip_through_hashed_file() {
    let (_temp, config) = setup();
    let cache = CredentialCache::new(&config);

    let document = json!({
        "AccessKeyId": "ASIAEXAMPLE",
        "SecretAccessKey": "wJalrXUtnFEMI/K7MDENG/bPxRfiCYEXAMPLEKEY",
        "SessionToken": "FwoGZXIvYXdzEXAMPLE",
        "Expiration": "2099-01-01T00:00:00Z"
    });
    let creds: StsCredentials = serde_json::from_value(document).unwrap();

    assert!(cache.write_sts_credentials(ROLE_ARN, &creds));
    let read = cache.read_sts_credentials(ROLE_ARN).unwrap();

    assert_eq!(read.access_key_id, "ASIAEXAMPLE");
    assert_eq!(read.secret_access_key, "wJalrXUtnFEMI/K7MDENG/bPxRfiCYEXAMPLEKEY");
    assert_eq!(read.session_token, "FwoGZXIvYXdzEXAMPLE");

    let names: Vec<String> = fs::read_dir(config.cache_dir())
        .unwrap()
        .map(|e| e.unwrap().file_name().into_string().unwrap())
        .collect();
    assert_eq!(
        names,
        vec!["stscreds_745bf2c7d98fd853c511d19658462b5d0e6f24009034b7b28f5d9e6595c585f9"]
    );

    let on_disk = fs::read_to_string(config.cache_dir().join(&names[0])).unwrap();
    assert!(on_disk.contains("\"Expiration\": \"2099-01-01T00:00:00Z\""));
    assert!(on_disk.ends_with("}\n"));
}

#[test]
fn sts_credentials_skew_boundary_is_exclusive() {
    let (_temp, config) = setup();
    let now = Utc.with_ymd_and_hms(2030, 3, 1, 8, 0, 0).unwrap();
    let cache = CredentialCache::new(&config).with_clock(fixed(now));

    let at_boundary = StsCredentials::new("A", "S", "T", now + Duration::seconds(300));
    assert!(cache.write_sts_credentials(ROLE_ARN, &at_boundary));
    assert!(cache.read_sts_credentials(ROLE_ARN).is_none());

    let past_boundary = StsCredentials::new("A", "S", "T", now + Duration::seconds(301));
    assert!(cache.write_sts_credentials(ROLE_ARN, &past_boundary));
    assert_eq!(cache.read_sts_credentials(ROLE_ARN), Some(past_boundary));
}

#[test]
fn sts_expiration_with_offset_is_a_miss() {
    let (_temp, config) = setup();
    let cache = CredentialCache::new(&config);
    assert!(cache.is_trusted());

    fs::write(
        config.cache_dir().join(keys::sts_credentials_file_name(ROLE_ARN)),
        r#"{"AccessKeyId":"A","SecretAccessKey":"S","SessionToken":"T","Expiration":"2099-01-01T00:00:00+00:00"}"#,
    )
    .unwrap();

    assert!(cache.read_sts_credentials(ROLE_ARN).is_none());
}

#[test]
fn role_map_ttl_follows_file_age() {
    let (_temp, config) = setup();
    let role_map: RoleMap = [
        ("admin".to_string(), json!({"arn": "arn:aws:iam::111122223333:role/admin"})),
        ("readonly".to_string(), json!({"arn": "arn:aws:iam::111122223333:role/ro"})),
    ]
    .into_iter()
    .collect();

    assert!(CredentialCache::new(&config).write_role_map(ROLES_URL, &role_map));

    let path = config.cache_dir().join(keys::role_map_file_name(ROLES_URL));
    let written: DateTime<Utc> = fs::metadata(&path).unwrap().modified().unwrap().into();

    let fresh = CredentialCache::new(&config).with_clock(fixed(written + Duration::seconds(3599)));
    assert_eq!(fresh.read_role_map(ROLES_URL), Some(role_map));

    let stale = CredentialCache::new(&config).with_clock(fixed(written + Duration::seconds(3600)));
    assert_eq!(stale.read_role_map(ROLES_URL), None);
}

#[test]
fn id_token_is_verified_on_every_read() {
    let (_temp, config) = setup();
    let now = Utc::now();
    let cache = CredentialCache::new(&config).with_clock(fixed(now));
    let jwks = jwks();

    let token = sign(CLIENT_ID, now.timestamp() + 3600, SECRET);
    assert!(cache.write_id_token(ISSUER, CLIENT_ID, &token));

    let verified = cache.read_id_token(ISSUER, CLIENT_ID, &jwks).unwrap();
    assert_eq!(verified.token, token);
    assert_eq!(verified.claims.sub.as_deref(), Some("ad|Mozilla-LDAP|user"));
    assert_eq!(verified.token.extra["expires_in"], 900);

    // Same key id, different key: the JWKS rotated since the token was cached
    let rotated: JwkSet = serde_json::from_value(json!({
        "keys": [{"kty": "oct", "kid": "k1", "k": "cm90YXRlZC1rZXktbWF0ZXJpYWwtZm9yLXRlc3Rz"}]
    }))
    .unwrap();
    assert!(cache.read_id_token(ISSUER, CLIENT_ID, &rotated).is_none());
}

#[test]
fn id_token_with_bad_signature_is_a_miss() {
    let (_temp, config) = setup();
    let cache = CredentialCache::new(&config);

    let forged = sign(CLIENT_ID, far_future().timestamp(), b"not-the-key-in-the-published-jwks");
    assert!(cache.write_id_token(ISSUER, CLIENT_ID, &forged));

    assert!(cache.read_id_token(ISSUER, CLIENT_ID, &jwks()).is_none());
}

#[test]
fn id_token_for_another_audience_is_a_miss() {
    let (_temp, config) = setup();
    let cache = CredentialCache::new(&config);

    let token = sign("someone-else", Utc::now().timestamp() + 3600, SECRET);
    assert!(cache.write_id_token(ISSUER, CLIENT_ID, &token));

    assert!(cache.read_id_token(ISSUER, CLIENT_ID, &jwks()).is_none());
}

#[test]
fn id_token_near_expiry_is_a_miss() {
    let (_temp, config) = setup();
    let now = Utc.with_ymd_and_hms(2030, 3, 1, 8, 0, 0).unwrap();
    let cache = CredentialCache::new(&config).with_clock(fixed(now));

    let token = sign(CLIENT_ID, now.timestamp() + 120, SECRET);
    assert!(cache.write_id_token(ISSUER, CLIENT_ID, &token));

    assert!(cache.read_id_token(ISSUER, CLIENT_ID, &jwks()).is_none());
}

#[test]
fn id_token_file_is_keyed_by_issuer_and_client() {
    let (_temp, config) = setup();
    let cache = CredentialCache::new(&config);

    let token = sign(CLIENT_ID, Utc::now().timestamp() + 3600, SECRET);
    assert!(cache.write_id_token(ISSUER, CLIENT_ID, &token));

    let expected = format!(
        "id_b0a7a50e12eb6fba434123c011075e74b9a22fff16488756b986523cfad47b8f_{CLIENT_ID}"
    );
    assert!(config.cache_dir().join(expected).is_file());
    assert!(cache.read_id_token("https://other.example.com/", CLIENT_ID, &jwks()).is_none());
}

#[test]
fn shared_credentials_merge_keeps_other_profiles() {
    let (_temp, config) = setup();
    let cache = CredentialCache::new(&config);
    assert!(cache.is_trusted());

    fs::write(
        config.credentials_path(),
        "[personal]\n\
         aws_access_key_id = AKIAPERSONAL\n\
         aws_secret_access_key = personal-secret\n\
         region = eu-central-1\n\
         \n\
         [maws-admin]\n\
         aws_access_key_id = OLD\n\
         output = json\n",
    )
    .unwrap();

    let creds = StsCredentials::new("ASIANEW", "new-secret", "new-token", Utc::now());
    let update: CredentialsFile = [("maws-admin".to_string(), creds.to_profile_section())]
        .into_iter()
        .collect();

    let path = cache.write_shared_credentials(&update).unwrap();
    assert_eq!(path, config.credentials_path());

    let merged = cache.read_shared_credentials();
    assert_eq!(merged.get("personal", "aws_access_key_id"), Some("AKIAPERSONAL"));
    assert_eq!(merged.get("personal", "region"), Some("eu-central-1"));
    assert_eq!(merged.get("maws-admin", "aws_access_key_id"), Some("ASIANEW"));
    assert_eq!(merged.get("maws-admin", "aws_session_token"), Some("new-token"));
    assert_eq!(merged.get("maws-admin", "output"), Some("json"));

    let names: Vec<&str> = merged.section_names().collect();
    assert_eq!(names, vec!["maws-admin", "personal"]);
}

#[test]
fn shared_credentials_merge_is_idempotent() {
    let (_temp, config) = setup();
    let cache = CredentialCache::new(&config);

    let mut update = CredentialsFile::new();
    update.set("b", "aws_access_key_id", "B");
    update.set("a", "aws_access_key_id", "A");

    cache.write_shared_credentials(&update).unwrap();
    let once = fs::read(config.credentials_path()).unwrap();

    cache.write_shared_credentials(&update).unwrap();
    let twice = fs::read(config.credentials_path()).unwrap();

    assert_eq!(once, twice);
    assert!(String::from_utf8(once).unwrap().starts_with("[a]\n"));
}

#[test]
fn shared_credentials_reject_injected_lines() {
    let (_temp, config) = setup();
    let cache = CredentialCache::new(&config);

    let mut existing = CredentialsFile::new();
    existing.set("p", "aws_access_key_id", "AK");
    cache.write_shared_credentials(&existing).unwrap();
    let before = fs::read(config.credentials_path()).unwrap();

    let mut injected = CredentialsFile::new();
    injected.set(
        "p",
        "aws_session_token",
        "tok\n[default]\naws_access_key_id = EVIL",
    );
    assert!(matches!(
        cache.write_shared_credentials(&injected),
        Err(maws_cache::CredentialsFileError::InvalidEntry { .. })
    ));

    let mut bad_name = CredentialsFile::new();
    bad_name.set("p]\n[default", "aws_access_key_id", "EVIL");
    assert!(cache.write_shared_credentials(&bad_name).is_err());

    assert_eq!(fs::read(config.credentials_path()).unwrap(), before);
    let names: Vec<String> = cache
        .read_shared_credentials()
        .section_names()
        .map(str::to_string)
        .collect();
    assert_eq!(names, vec!["p"]);
}

#[test]
fn shared_credentials_keep_new_empty_profile() {
    let (_temp, config) = setup();
    let cache = CredentialCache::new(&config);

    let mut existing = CredentialsFile::new();
    existing.set("a", "aws_access_key_id", "A");
    cache.write_shared_credentials(&existing).unwrap();

    let update: CredentialsFile = [("fresh".to_string(), maws_cache::Section::new())]
        .into_iter()
        .collect();
    cache.write_shared_credentials(&update).unwrap();

    let merged = cache.read_shared_credentials();
    assert_eq!(merged.section("fresh"), Some(&maws_cache::Section::new()));
    assert_eq!(merged.get("a", "aws_access_key_id"), Some("A"));
}

#[cfg(unix)]
mod unix {
    use super::*;
    use maws_cache::CredentialsFileError;
    use std::os::unix::fs::PermissionsExt;

    fn mode(path: &std::path::Path) -> u32 {
        fs::metadata(path).unwrap().permissions().mode() & 0o777
    }

    #[test]
    fn first_use_creates_owner_only_layout() {
        let (_temp, config) = setup();
        let cache = CredentialCache::new(&config);

        let creds = StsCredentials::new("A", "S", "T", far_future());
        assert!(cache.write_sts_credentials(ROLE_ARN, &creds));
        cache.write_shared_credentials(&CredentialsFile::new()).unwrap();

        assert_eq!(mode(&config.root), 0o700);
        assert_eq!(mode(&config.cache_dir()), 0o700);
        assert_eq!(mode(&config.credentials_path()), 0o600);
        let entry = config.cache_dir().join(keys::sts_credentials_file_name(ROLE_ARN));
        assert_eq!(mode(&entry), 0o600);
    }

    #[test]
    fn readable_root_fails_closed() {
        let (_temp, config) = setup();
        fs::create_dir(&config.root).unwrap();
        fs::set_permissions(&config.root, fs::Permissions::from_mode(0o755)).unwrap();
        let cache = CredentialCache::new(&config);

        let creds = StsCredentials::new("A", "S", "T", far_future());
        let token = sign(CLIENT_ID, Utc::now().timestamp() + 3600, SECRET);

        assert!(!cache.write_sts_credentials(ROLE_ARN, &creds));
        assert!(!cache.write_role_map(ROLES_URL, &RoleMap::new()));
        assert!(!cache.write_id_token(ISSUER, CLIENT_ID, &token));
        assert!(cache.read_sts_credentials(ROLE_ARN).is_none());
        assert!(cache.read_role_map(ROLES_URL).is_none());
        assert!(cache.read_id_token(ISSUER, CLIENT_ID, &jwks()).is_none());
        assert!(cache.read_shared_credentials().is_empty());

        let mut update = CredentialsFile::new();
        update.set("default", "aws_access_key_id", "A");
        assert!(matches!(
            cache.write_shared_credentials(&update),
            Err(CredentialsFileError::UnsafeRoot)
        ));

        assert!(!config.cache_dir().exists());
        assert!(!config.credentials_path().exists());
        assert_eq!(mode(&config.root), 0o755);
    }

    #[test]
    fn exposed_entry_is_narrowed_on_read() {
        let (_temp, config) = setup();
        let cache = CredentialCache::new(&config);

        let creds = StsCredentials::new("A", "S", "T", far_future());
        assert!(cache.write_sts_credentials(ROLE_ARN, &creds));

        let entry = config.cache_dir().join(keys::sts_credentials_file_name(ROLE_ARN));
        fs::set_permissions(&entry, fs::Permissions::from_mode(0o644)).unwrap();

        assert_eq!(cache.read_sts_credentials(ROLE_ARN), Some(creds));
        assert_eq!(mode(&entry), 0o600);
    }

    #[test]
    fn exposed_shared_credentials_are_narrowed_before_merge() {
        let (_temp, config) = setup();
        let cache = CredentialCache::new(&config);
        assert!(cache.is_trusted());

        fs::write(config.credentials_path(), "[keep]\naws_access_key_id = K\n").unwrap();
        fs::set_permissions(config.credentials_path(), fs::Permissions::from_mode(0o644))
            .unwrap();

        let mut update = CredentialsFile::new();
        update.set("new", "aws_access_key_id", "N");
        cache.write_shared_credentials(&update).unwrap();

        let merged = cache.read_shared_credentials();
        assert_eq!(merged.get("keep", "aws_access_key_id"), Some("K"));
        assert_eq!(merged.get("new", "aws_access_key_id"), Some("N"));
        assert_eq!(mode(&config.credentials_path()), 0o600);
    }
}
