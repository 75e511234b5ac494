//! Directory operations against a real endpoint.

#[cfg(test)]
mod tests {
    use s3vfs_core::VfsError;
    use s3vfs_core::directory::SearchOption;

    use crate::TestStorage;

    #[tokio::test]
    #[ignore = "requires running S3 endpoint"]
    async fn test_should_enumerate_created_file() {
        let t = TestStorage::new("enum").await;
        let scope = t.storage.scope();

        scope.directory().create_directory("/a/").await.expect("mkdir");
        scope.file().write_all_text("/a/b.txt", "hi").await.expect("write");

        let files = scope
            .directory()
            .enumerate_files("/a/", "*", SearchOption::TopDirectoryOnly)
            .await
            .expect("enumerate");
        assert_eq!(files, vec!["/a/b.txt"]);
        assert_eq!(scope.file().read_all_text("/a/b.txt").await.expect("read"), "hi");

        t.cleanup().await;
    }

    #[tokio::test]
    #[ignore = "requires running S3 endpoint"]
    async fn test_should_delete_directory_recursively() {
        let t = TestStorage::new("delete").await;
        let scope = t.storage.scope();
        scope.file().write_all_text("/a/b.txt", "hi").await.expect("write");

        let err = scope.directory().delete("/a/", false).await.unwrap_err();
        assert!(matches!(err, VfsError::DirectoryNotEmpty { .. }));

        scope.directory().delete("/a/", true).await.expect("delete");
        assert!(!t.storage.scope().directory().exists("/a/").await.expect("exists"));
        assert!(t.keys().await.is_empty());

        t.cleanup().await;
    }

    #[tokio::test]
    #[ignore = "requires running S3 endpoint"]
    async fn test_should_move_directory() {
        let t = TestStorage::new("move").await;
        let scope = t.storage.scope();
        scope.file().write_all_text("/a/b.txt", "moved").await.expect("write");
        std::fs::create_dir_all(t.local.path().join("a")).expect("mkdir");
        std::fs::write(t.local.path().join("a/local.txt"), "disk").expect("write local");

        scope.directory().move_directory("/a/", "/z/").await.expect("move");

        let fresh = t.storage.scope();
        assert!(!fresh.directory().exists("/a/").await.expect("exists"));
        assert_eq!(fresh.file().read_all_text("/z/b.txt").await.expect("read"), "moved");
        assert_eq!(fresh.file().read_all_text("/z/local.txt").await.expect("read"), "disk");

        t.cleanup().await;
    }
}
