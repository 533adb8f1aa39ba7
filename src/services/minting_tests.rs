//! Database-backed tests for the mint request state machine

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use sqlx::PgPool;
    use uuid::Uuid;

    use crate::services::blockfrost::{AssetInfo, ChainError, ChainIndex};
    use crate::services::minting::{
        asset_id_for, asset_name_for, MintingConfig, MintingError, MintingService, NftMinter,
    };

    /// Minter fake: succeeds or fails on command and remembers submissions
    struct FakeMinter {
        fail: bool,
        submitted: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl NftMinter for FakeMinter {
        async fn submit_mint(
            &self,
            asset_name: &str,
            _metadata: &serde_json::Value,
        ) -> Result<String, MintingError> {
            if self.fail {
                return Err(MintingError::Submission("gateway is down".to_string()));
            }
            self.submitted
                .lock()
                .unwrap()
                .push(asset_name.to_string());
            Ok(format!("tx-{asset_name}"))
        }
    }

    /// Chain fake: an asset exists once inserted into the set
    #[derive(Default)]
    struct FakeChain {
        assets: Mutex<HashSet<String>>,
    }

    #[async_trait]
    impl ChainIndex for FakeChain {
        async fn asset(&self, asset_id: &str) -> Result<Option<AssetInfo>, ChainError> {
            if self.assets.lock().unwrap().contains(asset_id) {
                Ok(Some(AssetInfo {
                    asset: asset_id.to_string(),
                    policy_id: "policy-1".to_string(),
                    initial_mint_tx_hash: "tx-confirmed".to_string(),
                }))
            } else {
                Ok(None)
            }
        }
    }

    async fn try_create_test_pool() -> Option<PgPool> {
        let _ = dotenvy::dotenv();
        let database_url = std::env::var("DATABASE_URL").ok()?;
        sqlx::postgres::PgPoolOptions::new()
            .max_connections(5)
            .connect(&database_url)
            .await
            .ok()
    }

    fn test_config(max_attempts: i32) -> MintingConfig {
        MintingConfig {
            policy_id: "policy-1".to_string(),
            gateway_url: "http://127.0.0.1:1/mint".to_string(),
            gateway_token: None,
            max_attempts,
        }
    }

    /// Create an archiving inspection with a queued mint request; returns
    /// (inspection id, inspection code)
    async fn create_queued_mint(pool: &PgPool) -> (Uuid, String) {
        let inspector_id = Uuid::new_v4();
        let suffix = Uuid::new_v4().simple().to_string();
        sqlx::query(
            r#"
            INSERT INTO users (user_id, username, email, full_name, role)
            VALUES ($1, $2, $3, 'Inspector', 'inspector')
            "#,
        )
        .bind(inspector_id)
        .bind(format!("ins-{suffix}"))
        .bind(format!("ins-{suffix}@example.com"))
        .execute(pool)
        .await
        .unwrap();

        let inspection_id = Uuid::new_v4();
        let code = format!("MNT-{}", &suffix[..12]);
        sqlx::query(
            r#"
            INSERT INTO inspections (inspection_id, inspection_code, plate_number,
                                     vehicle_brand, vehicle_model, branch_code,
                                     inspection_date, status, inspector_id)
            VALUES ($1, $2, 'AB 1 C', 'Toyota', 'Avanza', 'MNT', NOW(), 'archiving', $3)
            "#,
        )
        .bind(inspection_id)
        .bind(&code)
        .bind(inspector_id)
        .execute(pool)
        .await
        .unwrap();

        sqlx::query("INSERT INTO mint_requests (mint_id, inspection_id) VALUES ($1, $2)")
            .bind(Uuid::new_v4())
            .bind(inspection_id)
            .execute(pool)
            .await
            .unwrap();

        (inspection_id, code)
    }

    async fn mint_status(pool: &PgPool, inspection_id: Uuid) -> String {
        sqlx::query_scalar("SELECT status::text FROM mint_requests WHERE inspection_id = $1")
            .bind(inspection_id)
            .fetch_one(pool)
            .await
            .unwrap()
    }

    async fn inspection_status(pool: &PgPool, inspection_id: Uuid) -> String {
        sqlx::query_scalar("SELECT status::text FROM inspections WHERE inspection_id = $1")
            .bind(inspection_id)
            .fetch_one(pool)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_mint_walks_queued_submitted_confirmed() {
        let Some(pool) = try_create_test_pool().await else {
            return;
        };
        let (inspection_id, code) = create_queued_mint(&pool).await;

        let minter = Arc::new(FakeMinter {
            fail: false,
            submitted: Mutex::new(Vec::new()),
        });
        let chain = Arc::new(FakeChain::default());
        let service = MintingService::new(
            pool.clone(),
            minter.clone(),
            chain.clone(),
            test_config(5),
        );

        // Submission
        let submitted = service.process_queued().await.unwrap();
        assert!(submitted >= 1);
        assert_eq!(mint_status(&pool, inspection_id).await, "submitted");
        assert!(minter
            .submitted
            .lock()
            .unwrap()
            .contains(&asset_name_for(&code)));

        // Not on chain yet: stays submitted
        service.confirm_submitted().await.unwrap();
        assert_eq!(mint_status(&pool, inspection_id).await, "submitted");

        // Asset appears on chain: confirmed, inspection archived
        let asset_id = asset_id_for("policy-1", &asset_name_for(&code));
        chain.assets.lock().unwrap().insert(asset_id.clone());
        service.confirm_submitted().await.unwrap();

        assert_eq!(mint_status(&pool, inspection_id).await, "confirmed");
        assert_eq!(inspection_status(&pool, inspection_id).await, "archived");

        let (nft_asset_id, nft_tx_id): (Option<String>, Option<String>) = sqlx::query_as(
            "SELECT nft_asset_id, nft_tx_id FROM inspections WHERE inspection_id = $1",
        )
        .bind(inspection_id)
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(nft_asset_id.unwrap(), asset_id);
        assert_eq!(nft_tx_id.unwrap(), "tx-confirmed");
    }

    #[tokio::test]
    async fn test_mint_fails_after_attempt_cap_and_releases_inspection() {
        let Some(pool) = try_create_test_pool().await else {
            return;
        };
        let (inspection_id, _) = create_queued_mint(&pool).await;

        let minter = Arc::new(FakeMinter {
            fail: true,
            submitted: Mutex::new(Vec::new()),
        });
        let service = MintingService::new(
            pool.clone(),
            minter,
            Arc::new(FakeChain::default()),
            test_config(2),
        );

        // First failed attempt: still queued, error recorded
        service.process_queued().await.unwrap();
        assert_eq!(mint_status(&pool, inspection_id).await, "queued");
        let last_error: Option<String> = sqlx::query_scalar(
            "SELECT last_error FROM mint_requests WHERE inspection_id = $1",
        )
        .bind(inspection_id)
        .fetch_one(&pool)
        .await
        .unwrap();
        assert!(last_error.unwrap().contains("gateway is down"));

        // Second failed attempt hits the cap: request failed, inspection
        // returns to approved for a later retry
        service.process_queued().await.unwrap();
        assert_eq!(mint_status(&pool, inspection_id).await, "failed");
        assert_eq!(inspection_status(&pool, inspection_id).await, "approved");

        // Nothing left to pick up
        let submitted = service.process_queued().await.unwrap();
        assert_eq!(submitted, 0);
    }
}
