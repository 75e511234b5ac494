//! Multipart uploads against a real endpoint.

#[cfg(test)]
mod tests {
    use crate::TestStorage;

    #[tokio::test]
    #[ignore = "requires running S3 endpoint"]
    async fn test_should_upload_large_file_in_parts() {
        let t = TestStorage::new("multipart").await;
        let data: Vec<u8> = (0..12 * 1024 * 1024).map(|i| (i % 251) as u8).collect();

        let files = t.storage.scope().file();
        files.write_all_bytes("/big.bin", data.clone()).await.expect("write");

        let head = t
            .client
            .head_object()
            .bucket(&t.bucket)
            .key("big.bin")
            .send()
            .await
            .expect("head_object");
        assert_eq!(head.content_length(), Some(12 * 1024 * 1024));
        assert!(head.e_tag().is_some_and(|e| e.ends_with("-3\"")));

        let read = t.storage.scope().file().read_all_bytes("/big.bin").await.expect("read");
        assert_eq!(read.as_ref(), &data[..]);

        t.cleanup().await;
    }
}
