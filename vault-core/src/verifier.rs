use crate::Result;
use crate::constants::backup::CHECKSUM_BUFFER_SIZE;
use sha2::{Digest, Sha256};
use std::path::Path;
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tracing::{debug, info, warn};

/// 计算文件的SHA256哈希值
///
/// 以固定大小缓冲区流式读取，内存占用与文件大小无关。
pub async fn checksum(path: &Path) -> Result<String> {
    let mut file = File::open(path).await?;

    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; CHECKSUM_BUFFER_SIZE];
    let mut total = 0u64;

    loop {
        let bytes_read = file.read(&mut buffer).await?;
        if bytes_read == 0 {
            break;
        }

        hasher.update(&buffer[..bytes_read]);
        total += bytes_read as u64;
    }

    let hash = hasher.finalize();
    debug!(path = %path.display(), bytes = total, "校验和计算完成");
    Ok(format!("{hash:x}"))
}

/// 验证文件完整性
pub async fn verify(path: &Path, expected: &str) -> Result<bool> {
    let actual = checksum(path).await?;
    let matches = actual.eq_ignore_ascii_case(expected);

    if matches {
        info!("✅ 文件完整性验证通过: {}", path.display());
    } else {
        warn!("❌ 文件完整性验证失败: {}", path.display());
        warn!("   期望哈希: {}", expected);
        warn!("   实际哈希: {}", actual);
    }

    Ok(matches)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_checksum_is_deterministic() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("artifact.gz");
        // 跨越多个缓冲区
        let content: Vec<u8> = (0..(CHECKSUM_BUFFER_SIZE * 3 + 17))
            .map(|i| (i % 251) as u8)
            .collect();
        std::fs::write(&path, &content).unwrap();

        let first = checksum(&path).await.unwrap();
        let second = checksum(&path).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 64);
        assert_eq!(first, format!("{:x}", Sha256::digest(&content)));
    }

    #[tokio::test]
    async fn test_checksum_known_vector() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("abc");
        std::fs::write(&path, b"abc").unwrap();

        assert_eq!(
            checksum(&path).await.unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert!(
            verify(
                &path,
                "BA7816BF8F01CFEA414140DE5DAE2223B00361A396177A9CB410FF61F20015AD"
            )
            .await
            .unwrap()
        );
    }

    #[tokio::test]
    async fn test_checksum_missing_file_is_io_error() {
        let dir = tempdir().unwrap();
        let err = checksum(&dir.path().join("gone.gz")).await.unwrap_err();
        assert!(err.is_missing_file());
    }
}
