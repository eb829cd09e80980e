//! 认证管理
//!
//! 静态用户表 + sha256 签名的会话令牌。令牌格式
//! `username:expires_at_ms:signature`，签名覆盖用户名与过期时间，
//! 注销通过撤销集合实现。

use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use tracing::debug;

/// 默认令牌有效期：24 小时
const TOKEN_TTL_MS: u64 = 24 * 60 * 60 * 1000;

pub struct AuthManager {
    users: HashMap<String, String>,
    secret: String,
    token_ttl_ms: u64,
    revoked: Mutex<HashSet<String>>,
}

impl AuthManager {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            users: default_users(),
            secret: secret.into(),
            token_ttl_ms: TOKEN_TTL_MS,
            revoked: Mutex::new(HashSet::new()),
        }
    }

    #[cfg(test)]
    fn with_ttl(secret: &str, token_ttl_ms: u64) -> Self {
        Self {
            users: default_users(),
            secret: secret.to_string(),
            token_ttl_ms,
            revoked: Mutex::new(HashSet::new()),
        }
    }

    /// 验证用户名密码，成功则签发令牌
    pub fn authenticate(
        &self,
        username: &str,
        password: &str,
        now_ms: u64,
    ) -> Option<(String, u64)> {
        match self.users.get(username) {
            Some(expected) if expected == password => {
                let expires_at_ms = now_ms + self.token_ttl_ms;
                let token = format!(
                    "{}:{}:{}",
                    username,
                    expires_at_ms,
                    self.sign(username, expires_at_ms)
                );
                Some((token, expires_at_ms))
            }
            _ => {
                debug!("Authentication failed for user {}", username);
                None
            }
        }
    }

    /// 校验令牌，返回其主体（用户名）
    pub fn validate(&self, token: &str, now_ms: u64) -> Option<String> {
        if self.revoked.lock().contains(token) {
            return None;
        }

        // 从右侧拆分，用户名中允许出现分隔符以外的任意字符
        let mut parts = token.rsplitn(3, ':');
        let signature = parts.next()?;
        let expires_at_ms: u64 = parts.next()?.parse().ok()?;
        let username = parts.next()?;

        if expires_at_ms <= now_ms {
            self.revoked.lock().remove(token);
            return None;
        }
        if self.sign(username, expires_at_ms) != signature {
            return None;
        }
        Some(username.to_string())
    }

    /// 注销令牌
    pub fn logout(&self, token: &str) {
        self.revoked.lock().insert(token.to_string());
    }

    fn sign(&self, username: &str, expires_at_ms: u64) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.secret.as_bytes());
        hasher.update(b":");
        hasher.update(username.as_bytes());
        hasher.update(b":");
        hasher.update(expires_at_ms.to_le_bytes());
        hex::encode(hasher.finalize())
    }
}

fn default_users() -> HashMap<String, String> {
    [
        ("user1", "password1"),
        ("user2", "password2"),
        ("admin", "admin123"),
    ]
    .into_iter()
    .map(|(u, p)| (u.to_string(), p.to_string()))
    .collect()
}
