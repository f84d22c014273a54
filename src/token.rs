//! 下载令牌生成。

use rand::RngCore;

/// 令牌的随机字节数，十六进制编码后为 32 个字符。
pub const TOKEN_BYTES: usize = 16;

/// 从操作系统熵源播种的 CSPRNG 生成一个小写十六进制令牌。
///
/// 不检查与已有令牌的碰撞；随机源失败会直接 panic。
pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_is_32_lowercase_hex_chars() {
        let token = generate_token();
        assert_eq!(token.len(), TOKEN_BYTES * 2);
        assert!(
            token
                .chars()
                .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
        );
    }

    #[test]
    fn consecutive_tokens_differ() {
        assert_ne!(generate_token(), generate_token());
    }
}
