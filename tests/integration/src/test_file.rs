//! File operations and metadata against a real endpoint.

#[cfg(test)]
mod tests {
    use crate::TestStorage;

    #[tokio::test]
    #[ignore = "requires running S3 endpoint"]
    async fn test_should_persist_lock_across_scopes() {
        let t = TestStorage::new("lock").await;
        let scope = t.storage.scope();
        scope.file().write_all_text("/a/b.txt", "x").await.expect("write");

        let info = scope.object_info("/a/b.txt").expect("remote path");
        info.set_metadata("Lock", "True", true, true).await.expect("lock");

        let fresh = t.storage.scope().object_info("/a/b.txt").expect("remote path");
        assert!(fresh.is_locked().await.expect("is_locked"));
        assert!(t.keys().await.contains(&"__metadata/a/b.txt.meta".to_owned()));

        t.cleanup().await;
    }

    #[tokio::test]
    #[ignore = "requires running S3 endpoint"]
    async fn test_should_copy_and_move_files() {
        let t = TestStorage::new("copy").await;
        let files = t.storage.scope().file();
        files.write_all_text("/src.txt", "content").await.expect("write");

        files.copy("/src.txt", "/copy.txt", false).await.expect("copy");
        files.move_file("/copy.txt", "/dir/moved.txt").await.expect("move");

        let fresh = t.storage.scope().file();
        assert!(!fresh.exists("/copy.txt").await.expect("exists"));
        assert_eq!(
            fresh.read_all_text("/dir/moved.txt").await.expect("read"),
            "content"
        );

        t.cleanup().await;
    }

    #[tokio::test]
    #[ignore = "requires running S3 endpoint"]
    async fn test_should_fall_back_to_local_content() {
        let t = TestStorage::new("fallback").await;
        std::fs::write(t.local.path().join("legacy.txt"), "disk").expect("write local");

        let files = t.storage.scope().file();
        assert!(files.exists("/legacy.txt").await.expect("exists"));
        assert_eq!(files.read_all_text("/legacy.txt").await.expect("read"), "disk");
        assert!(t.keys().await.is_empty());

        t.cleanup().await;
    }
}
