//! A from-scratch ACME v2 (RFC 8555) client: account bootstrap, JWS request
//! signing, HTTP-01 challenge solving through the registry's challenge
//! cache, and certificate issuance/renewal.

use std::sync::Arc;
use std::time::Duration;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rsa::pkcs8::{DecodePrivateKey, EncodePrivateKey, LineEnding};
use rsa::{
    pkcs1v15::SigningKey,
    signature::{SignatureEncoding, Signer},
    RsaPrivateKey,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{error, info};

use crate::config::Config;
use crate::error::AppError;
use crate::registry::models::Certificate;
use crate::registry::Registry;

type Result<T> = std::result::Result<T, AppError>;

const STAGING_DIRECTORY: &str = "https://acme-staging-v02.api.letsencrypt.org/directory";
const PRODUCTION_DIRECTORY: &str = "https://acme-v02.api.letsencrypt.org/directory";
const POLL_ATTEMPTS: u32 = 30;
const POLL_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Deserialize)]
struct Directory {
    #[serde(rename = "newNonce")]
    new_nonce: String,
    #[serde(rename = "newAccount")]
    new_account: String,
    #[serde(rename = "newOrder")]
    new_order: String,
}

#[derive(Debug, Deserialize)]
struct Identifier {
    #[serde(rename = "type")]
    #[allow(dead_code)]
    kind: String,
    value: String,
}

#[derive(Debug, Deserialize)]
struct Order {
    status: String,
    authorizations: Vec<String>,
    finalize: String,
    certificate: Option<String>,
    #[allow(dead_code)]
    identifiers: Option<Vec<Identifier>>,
}

#[derive(Debug, Deserialize)]
struct Authorization {
    challenges: Vec<Challenge>,
}

#[derive(Debug, Clone, Deserialize)]
struct Challenge {
    #[serde(rename = "type")]
    kind: String,
    url: String,
    token: String,
}

#[derive(Debug, Deserialize)]
struct ChallengeStatus {
    status: String,
}

pub struct AcmeClient {
    registry: Arc<Registry>,
    config: Arc<Config>,
    http: reqwest::Client,
    directory_url: String,
    account_key: RwLock<Option<RsaPrivateKey>>,
    account_uri: RwLock<Option<String>>,
    directory: RwLock<Option<Directory>>,
    nonce: RwLock<Option<String>>,
}

impl AcmeClient {
    pub fn new(registry: Arc<Registry>, config: Arc<Config>) -> Self {
        let directory_url = if config.acme_staging { STAGING_DIRECTORY } else { PRODUCTION_DIRECTORY }.to_string();
        Self {
            registry,
            config,
            http: reqwest::Client::builder().timeout(Duration::from_secs(30)).build().unwrap_or_default(),
            directory_url,
            account_key: RwLock::new(None),
            account_uri: RwLock::new(None),
            directory: RwLock::new(None),
            nonce: RwLock::new(None),
        }
    }

    pub async fn start(&self) -> Result<()> {
        fs::create_dir_all(&self.config.certs_path)
            .await
            .map_err(|e| AppError::internal(&format!("failed to create certs directory: {e}")))?;
        let accounts_dir = format!("{}/accounts", self.config.certs_path);
        fs::create_dir_all(&accounts_dir)
            .await
            .map_err(|e| AppError::internal(&format!("failed to create accounts directory: {e}")))?;
        self.load_or_create_account(&accounts_dir).await?;
        info!(staging = self.config.acme_staging, "acme client started");
        Ok(())
    }

    async fn load_or_create_account(&self, accounts_dir: &str) -> Result<()> {
        let key_path = format!("{accounts_dir}/account.key");
        let key = match fs::read_to_string(&key_path).await {
            Ok(pem) => {
                let key = RsaPrivateKey::from_pkcs8_pem(&pem)
                    .map_err(|e| AppError::internal(&format!("malformed account key: {e}")))?;
                info!("acme account key loaded");
                key
            }
            Err(_) => {
                let mut rng = rand::thread_rng();
                let key = RsaPrivateKey::new(&mut rng, 2048)
                    .map_err(|e| AppError::internal(&format!("account key generation failed: {e}")))?;
                let pem = key
                    .to_pkcs8_pem(LineEnding::LF)
                    .map_err(|e| AppError::internal(&format!("account key encoding failed: {e}")))?;
                fs::write(&key_path, pem.as_bytes())
                    .await
                    .map_err(|e| AppError::internal(&format!("failed to persist account key: {e}")))?;
                info!("acme account key created");
                key
            }
        };
        *self.account_key.write().await = Some(key);

        let resp = self.http.get(&self.directory_url).send().await?;
        let directory: Directory = resp.json().await?;
        *self.directory.write().await = Some(directory);

        self.register_account().await
    }

    async fn get_nonce(&self) -> Result<String> {
        if let Some(nonce) = self.nonce.write().await.take() {
            return Ok(nonce);
        }
        let url = self.directory.read().await.as_ref().map(|d| d.new_nonce.clone()).unwrap_or_default();
        let resp = self.http.head(&url).send().await?;
        let nonce = resp
            .headers()
            .get("Replay-Nonce")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| AppError::AcmeOrderInvalid("directory did not return a nonce".into()))?;
        Ok(nonce)
    }

    async fn jwk(&self) -> Result<Value> {
        let guard = self.account_key.read().await;
        let key = guard.as_ref().ok_or_else(|| AppError::internal("acme account key not loaded"))?;
        let public = key.to_public_key();
        Ok(json!({
            "kty": "RSA",
            "n": URL_SAFE_NO_PAD.encode(public.n().to_bytes_be()),
            "e": URL_SAFE_NO_PAD.encode(public.e().to_bytes_be()),
        }))
    }

    async fn thumbprint(&self) -> Result<String> {
        let jwk = self.jwk().await?;
        // RFC 7638 requires lexicographic key ordering with no extra whitespace.
        let canonical = format!(
            r#"{{"e":"{}","kty":"RSA","n":"{}"}}"#,
            jwk["e"].as_str().unwrap_or_default(),
            jwk["n"].as_str().unwrap_or_default(),
        );
        let digest = Sha256::digest(canonical.as_bytes());
        Ok(URL_SAFE_NO_PAD.encode(digest))
    }

    async fn signed_request(&self, url: &str, payload: Option<Value>) -> Result<reqwest::Response> {
        let nonce = self.get_nonce().await?;
        let mut protected = json!({ "alg": "RS256", "nonce": nonce, "url": url });
        if let Some(kid) = self.account_uri.read().await.clone() {
            protected["kid"] = json!(kid);
        } else {
            protected["jwk"] = self.jwk().await?;
        }
        let protected_b64 = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&protected)?);
        let payload_b64 = match &payload {
            Some(p) => URL_SAFE_NO_PAD.encode(serde_json::to_vec(p)?),
            None => String::new(),
        };
        let signing_input = format!("{protected_b64}.{payload_b64}");

        let signature = {
            let guard = self.account_key.read().await;
            let key = guard.as_ref().ok_or_else(|| AppError::internal("acme account key not loaded"))?;
            let signing_key = SigningKey::<Sha256>::new(key.clone());
            signing_key.sign(signing_input.as_bytes()).to_vec()
        };

        let jws = json!({
            "protected": protected_b64,
            "payload": payload_b64,
            "signature": URL_SAFE_NO_PAD.encode(signature),
        });

        let resp = self
            .http
            .post(url)
            .header("Content-Type", "application/jose+json")
            .json(&jws)
            .send()
            .await?;

        if let Some(next_nonce) = resp.headers().get("Replay-Nonce").and_then(|v| v.to_str().ok()) {
            *self.nonce.write().await = Some(next_nonce.to_string());
        }
        Ok(resp)
    }

    async fn register_account(&self) -> Result<()> {
        let new_account_url = self.directory.read().await.as_ref().map(|d| d.new_account.clone()).unwrap_or_default();
        let payload = json!({
            "termsOfServiceAgreed": true,
            "contact": [format!("mailto:{}", self.config.acme_email)],
        });
        let resp = self.signed_request(&new_account_url, Some(payload)).await?;
        if resp.status().is_success() {
            let location = resp.headers().get("Location").and_then(|v| v.to_str().ok()).map(str::to_string);
            *self.account_uri.write().await = location.clone();
            info!(account = ?location, "acme account registered");
            Ok(())
        } else {
            let body = resp.text().await.unwrap_or_default();
            error!("account registration failed: {body}");
            Err(AppError::AcmeOrderInvalid(body))
        }
    }

    /// Runs a full order→authorize→HTTP-01 challenge→finalize→download cycle
    /// for a single domain and persists the resulting certificate.
    pub async fn obtain_certificate(&self, domain: &str) -> Result<Option<Certificate>> {
        info!(domain, "requesting certificate");
        let new_order_url = self.directory.read().await.as_ref().map(|d| d.new_order.clone()).unwrap_or_default();
        let order_resp = self
            .signed_request(&new_order_url, Some(json!({ "identifiers": [{"type": "dns", "value": domain}] })))
            .await?;
        if !order_resp.status().is_success() {
            error!("order failed: {}", order_resp.text().await.unwrap_or_default());
            return Ok(None);
        }
        let order_url = order_resp.headers().get("Location").and_then(|v| v.to_str().ok()).map(str::to_string);
        let mut order: Order = order_resp.json().await?;

        for auth_url in &order.authorizations {
            let auth_resp = self.signed_request(auth_url, None).await?;
            let auth: Authorization = auth_resp.json().await?;
            if let Some(challenge) = auth.challenges.iter().find(|c| c.kind == "http-01") {
                if !self.solve_http01(domain, challenge).await? {
                    return Ok(None);
                }
            }
        }

        let mut rng = rand::thread_rng();
        let domain_key = RsaPrivateKey::new(&mut rng, 2048)
            .map_err(|e| AppError::internal(&format!("domain key generation failed: {e}")))?;
        let csr_der = generate_csr(domain, &domain_key)?;
        let finalize_resp = self
            .signed_request(&order.finalize, Some(json!({ "csr": URL_SAFE_NO_PAD.encode(csr_der) })))
            .await?;
        if !finalize_resp.status().is_success() {
            error!("finalize failed: {}", finalize_resp.text().await.unwrap_or_default());
            return Ok(None);
        }

        let Some(order_url) = order_url else {
            return Err(AppError::AcmeOrderInvalid("order response carried no Location".into()));
        };
        for _ in 0..POLL_ATTEMPTS {
            let check_resp = self.signed_request(&order_url, None).await?;
            order = check_resp.json().await?;
            match order.status.as_str() {
                "valid" => break,
                "invalid" => {
                    error!(domain, "order invalid");
                    return Ok(None);
                }
                _ => tokio::time::sleep(POLL_INTERVAL).await,
            }
        }
        if order.status != "valid" {
            error!(domain, "order timed out waiting for validation");
            return Ok(None);
        }

        let Some(cert_url) = order.certificate else {
            return Err(AppError::AcmeOrderInvalid("valid order carried no certificate URL".into()));
        };
        let cert_resp = self.signed_request(&cert_url, None).await?;
        if !cert_resp.status().is_success() {
            error!("cert download failed: {}", cert_resp.text().await.unwrap_or_default());
            return Ok(None);
        }
        let cert_pem = cert_resp.text().await?;

        let key_pem = domain_key
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| AppError::internal(&format!("domain key encoding failed: {e}")))?;
        let cert_path = format!("{}/{domain}.crt", self.config.certs_path);
        let key_path = format!("{}/{domain}.key", self.config.certs_path);
        fs::write(&cert_path, &cert_pem).await.map_err(|e| AppError::internal(&format!("cert write failed: {e}")))?;
        fs::write(&key_path, key_pem.as_bytes()).await.map_err(|e| AppError::internal(&format!("key write failed: {e}")))?;

        let expires_at = parse_x509_expiry(&cert_pem).unwrap_or_else(|| chrono::Utc::now().timestamp() + 90 * 86400);

        let certificate = Certificate {
            domain: domain.to_string(),
            cert_path,
            key_path,
            expires_at,
            auto_renew: true,
        };
        self.registry.set_certificate(&certificate).await?;
        info!(domain, expires_at, "certificate obtained");
        Ok(Some(certificate))
    }

    async fn solve_http01(&self, domain: &str, challenge: &Challenge) -> Result<bool> {
        let key_auth = format!("{}.{}", challenge.token, self.thumbprint().await?);
        self.registry.set_acme_challenge(&challenge.token, &key_auth).await?;
        info!(domain, token = %challenge.token, "http-01 challenge set");

        let notify = self.signed_request(&challenge.url, Some(json!({}))).await?;
        if !notify.status().is_success() {
            error!("challenge notify failed: {}", notify.text().await.unwrap_or_default());
            self.registry.delete_acme_challenge(&challenge.token).await?;
            return Ok(false);
        }

        for _ in 0..POLL_ATTEMPTS {
            tokio::time::sleep(POLL_INTERVAL).await;
            let check = self.signed_request(&challenge.url, None).await?;
            let status: ChallengeStatus = check.json().await?;
            match status.status.as_str() {
                "valid" => {
                    info!(domain, "challenge valid");
                    self.registry.delete_acme_challenge(&challenge.token).await?;
                    return Ok(true);
                }
                "invalid" => {
                    error!(domain, "challenge invalid");
                    self.registry.delete_acme_challenge(&challenge.token).await?;
                    return Ok(false);
                }
                _ => continue,
            }
        }
        error!(domain, "challenge timed out");
        self.registry.delete_acme_challenge(&challenge.token).await?;
        Ok(false)
    }

    /// Hourly renewal sweep: anything expiring within `days_before` days with
    /// `auto_renew` set is re-issued.
    pub async fn renew_expiring(&self, days_before: i64) -> Result<Vec<Certificate>> {
        let threshold = chrono::Utc::now().timestamp() + days_before * 86400;
        let expiring = self.registry.get_expiring_certificates(threshold).await?;
        let mut renewed = Vec::new();
        for cert in expiring {
            if !cert.auto_renew {
                continue;
            }
            info!(domain = %cert.domain, "renewing certificate");
            if let Some(new_cert) = self.obtain_certificate(&cert.domain).await? {
                renewed.push(new_cert);
            }
        }
        Ok(renewed)
    }
}

fn generate_csr(domain: &str, key: &RsaPrivateKey) -> Result<Vec<u8>> {
    let pkcs8_der = key
        .to_pkcs8_der()
        .map_err(|e| AppError::internal(&format!("domain key DER encoding failed: {e}")))?;
    let key_pair = rcgen::KeyPair::from_der(pkcs8_der.as_bytes())
        .map_err(|e| AppError::internal(&format!("rcgen key import failed: {e}")))?;
    let params = rcgen::CertificateParams::new(vec![domain.to_string()])
        .map_err(|e| AppError::internal(&format!("invalid CSR subject: {e}")))?;
    let csr = params
        .serialize_request(&key_pair)
        .map_err(|e| AppError::internal(&format!("CSR serialization failed: {e}")))?;
    Ok(csr.der().to_vec())
}

fn parse_x509_expiry(cert_pem: &str) -> Option<i64> {
    let (_, pem) = x509_parser::pem::parse_x509_pem(cert_pem.as_bytes()).ok()?;
    let (_, cert) = x509_parser::parse_x509_certificate(&pem.contents).ok()?;
    Some(cert.validity().not_after.timestamp())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thumbprint_is_stable_for_same_key() {
        let json_a = json!({"e": "AQAB", "kty": "RSA", "n": "abc"});
        let canonical_a = format!(
            r#"{{"e":"{}","kty":"RSA","n":"{}"}}"#,
            json_a["e"].as_str().unwrap(),
            json_a["n"].as_str().unwrap()
        );
        let digest_a = Sha256::digest(canonical_a.as_bytes());
        let digest_b = Sha256::digest(canonical_a.as_bytes());
        assert_eq!(digest_a, digest_b);
    }
}
