//! The aws-sdk-s3 transport against a real endpoint.

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use s3vfs_aws::{AccountInfo, AwsObjectStore};
    use s3vfs_core::config::VfsConfig;
    use s3vfs_core::error::VfsError;
    use s3vfs_core::store::ObjectStoreClient;

    use crate::{cleanup_bucket, create_test_bucket, endpoint_url, s3_client};

    fn account_config(bucket: &str) -> VfsConfig {
        VfsConfig::builder()
            .bucket(bucket.to_owned())
            .endpoint(endpoint_url())
            .region("eu-central-1".to_owned())
            .force_path_style(true)
            .access_key_id("test".to_owned())
            .secret_access_key("test".to_owned())
            .build()
    }

    #[tokio::test]
    #[ignore = "requires running S3 endpoint"]
    async fn test_should_connect_only_to_existing_bucket() {
        let client = s3_client();
        let bucket = create_test_bucket(&client, "account").await;

        let account = AccountInfo::connect(account_config(&bucket)).await.expect("connect");
        assert_eq!(account.region(), "eu-central-1");

        let err = AccountInfo::connect(account_config(&format!("{bucket}-typo")))
            .await
            .unwrap_err();
        assert!(matches!(err, VfsError::Configuration(_)));

        cleanup_bucket(&client, &bucket).await;
    }

    #[tokio::test]
    #[ignore = "requires running S3 endpoint"]
    async fn test_should_report_missing_keys_as_not_found() {
        let client = s3_client();
        let bucket = create_test_bucket(&client, "notfound").await;
        let store = AwsObjectStore::new(client.clone());

        assert!(store.head_object(&bucket, "missing").await.unwrap_err().is_not_found());
        assert!(store.get_object(&bucket, "missing").await.unwrap_err().is_not_found());
        store.delete_object(&bucket, "missing").await.expect("delete missing");

        cleanup_bucket(&client, &bucket).await;
    }

    #[tokio::test]
    #[ignore = "requires running S3 endpoint"]
    async fn test_should_list_with_delimiter_and_pages() {
        let client = s3_client();
        let bucket = create_test_bucket(&client, "list").await;
        let store = AwsObjectStore::new(client.clone());
        for key in ["d/a.txt", "d/b.txt", "d/sub/c.txt", "e.txt"] {
            store.put_object(&bucket, key, Bytes::from_static(b"x")).await.expect("put");
        }

        let page = store
            .list_objects(&bucket, "d/", Some("/"), None, 1000)
            .await
            .expect("list");
        let keys: Vec<_> = page.objects.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(keys, vec!["d/a.txt", "d/b.txt"]);
        assert_eq!(page.common_prefixes, vec!["d/sub/"]);

        let first = store.list_objects(&bucket, "", None, None, 2).await.expect("page 1");
        assert_eq!(first.objects.len(), 2);
        let token = first.next_token.expect("more pages");
        let second = store
            .list_objects(&bucket, "", None, Some(&token), 2)
            .await
            .expect("page 2");
        assert_eq!(second.objects.len(), 2);

        cleanup_bucket(&client, &bucket).await;
    }

    #[tokio::test]
    #[ignore = "requires running S3 endpoint"]
    async fn test_should_batch_delete_and_copy() {
        let client = s3_client();
        let bucket = create_test_bucket(&client, "batch").await;
        let store = AwsObjectStore::new(client.clone());
        store.put_object(&bucket, "a b.txt", Bytes::from_static(b"1")).await.expect("put");
        store
            .copy_object(&bucket, "a b.txt", &bucket, "copy.txt")
            .await
            .expect("copy");

        let failed = store
            .delete_objects(&bucket, &["a b.txt".to_owned(), "copy.txt".to_owned()])
            .await
            .expect("delete_objects");
        assert!(failed.is_empty());
        assert!(store.head_object(&bucket, "copy.txt").await.unwrap_err().is_not_found());

        cleanup_bucket(&client, &bucket).await;
    }
}
