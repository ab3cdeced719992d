//! Integration tests for payrail.
//!
//! Anvil-dependent tests use **testcontainers** to spin up a Docker-based
//! Anvil node automatically, so no manual `anvil &` is needed.
//!
//! ```bash
//! # Run everything (Docker must be available):
//! cargo test -p payrail-integration-tests -- --include-ignored
//! ```

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use alloy::primitives::{Address, B256, U256};
    use alloy::providers::Provider;
    use futures::StreamExt;
    use num_bigint::BigUint;
    use payrail_core::config::Config;
    use payrail_core::{ErrorKind, PayoutAdapter, PayoutBatch, PayoutError, ValidationError};
    use payrail_evm::{EventCursor, EvmClient, EvmPayoutAdapter, EvmPayoutError, PayoutRevert};
    use payrail_neo::{NeoPayoutAdapter, NeoPayoutError};
    use payrail_signer::LocalSigner;
    use testcontainers::{
        core::{IntoContainerPort, WaitFor},
        runners::SyncRunner,
        Container, GenericImage, ImageExt,
    };

    /// Anvil default accounts 0 (owner), 1 and 2.
    const OWNER_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
    const X_KEY: &str = "59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d";
    const X: &str = "0x70997970C51812dc3A010C7d01b50e0d17dc79C8";
    const Y: &str = "0x3C44CdDdB6a900fa2b585dd299e03d12FA4293BC";

    /// Spins up a Docker Anvil container and returns `(container, rpc_url)`.
    /// The container is dropped (and removed) when it goes out of scope.
    fn start_anvil() -> (Container<GenericImage>, String) {
        let image = GenericImage::new("ghcr.io/foundry-rs/foundry", "latest")
            .with_exposed_port(8545.tcp())
            .with_wait_for(WaitFor::message_on_stdout("Listening on"))
            .with_entrypoint("anvil")
            .with_cmd(vec![
                "--host".to_string(),
                "0.0.0.0".to_string(),
                "--port".to_string(),
                "8545".to_string(),
                "--chain-id".to_string(),
                "31337".to_string(),
            ]);

        let container = image.start().expect("Docker must be available to run Anvil tests");
        let host_port = container.get_host_port_ipv4(8545).expect("failed to get mapped port");
        let url = format!("http://127.0.0.1:{}", host_port);
        (container, url)
    }

    fn client(url: &str) -> EvmClient {
        EvmClient::new(url)
            .expect("valid URL")
            .with_poll_interval(Duration::from_millis(200))
    }

    async fn wait_for_receipt(client: &EvmClient, tx_hash: B256) {
        for _ in 0..20 {
            if let Ok(Some(receipt)) = client.provider().get_transaction_receipt(tx_hash).await {
                assert!(receipt.status(), "transaction {tx_hash} reverted");
                return;
            }
            tokio::time::sleep(Duration::from_millis(250)).await;
        }
        panic!("no receipt for {tx_hash}");
    }

    fn hash(id: &payrail_core::TxId) -> B256 {
        id.as_str().parse().expect("tx id is a 32-byte hash")
    }

    async fn deploy(url: &str) -> EvmPayoutAdapter {
        let signer = LocalSigner::from_hex(OWNER_KEY).unwrap();
        let (adapter, outcome) = EvmPayoutAdapter::deploy(client(url), signer)
            .await
            .expect("deploy should succeed on Anvil");
        wait_for_receipt(&client(url), hash(&outcome.tx_id)).await;
        adapter
    }

    // -----------------------------------------------------------------
    // EVM end-to-end: deploy, fill, balances, release, events
    // -----------------------------------------------------------------

    #[test]
    #[ignore]
    fn test_deploy_and_batch_payout() {
        let (_anvil, url) = start_anvil();

        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let adapter = deploy(&url).await;
            let code = client(&url)
                .provider()
                .get_code_at(adapter.contract())
                .await
                .unwrap();
            assert!(!code.is_empty(), "contract should have code");

            let batch = PayoutBatch::from_pairs([(X, 100u64), (Y, 50u64)]).unwrap();
            let tx_id = adapter.payout(&batch).await.unwrap();
            wait_for_receipt(&client(&url), hash(&tx_id)).await;

            assert_eq!(adapter.balance_of(X).await.unwrap(), BigUint::from(100u64));
            assert_eq!(adapter.balance_of(Y).await.unwrap(), BigUint::from(50u64));

            let contract_balance = client(&url)
                .provider()
                .get_balance(adapter.contract())
                .await
                .unwrap();
            assert_eq!(contract_balance, U256::from(150u64));
        });
    }

    #[test]
    #[ignore]
    fn test_sequential_payouts_use_consecutive_nonces() {
        let (_anvil, url) = start_anvil();

        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let adapter = deploy(&url).await;
            let batch = PayoutBatch::from_pairs([(X, 1u64)]).unwrap();

            // Submitted back to back without waiting for inclusion.
            let (a, b, c) = tokio::join!(
                adapter.payout(&batch),
                adapter.payout(&batch),
                adapter.payout(&batch)
            );
            for id in [a.unwrap(), b.unwrap(), c.unwrap()] {
                wait_for_receipt(&client(&url), hash(&id)).await;
            }
            assert_eq!(adapter.balance_of(X).await.unwrap(), BigUint::from(3u64));
        });
    }

    #[test]
    #[ignore]
    fn test_release_emits_payment_released() {
        let (_anvil, url) = start_anvil();

        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let owner = deploy(&url).await;
            let start = client(&url).provider().get_block_number().await.unwrap();

            let mut subscription = owner
                .watch_payment_released(EventCursor::from_block(start))
                .await
                .unwrap();

            let batch = PayoutBatch::from_pairs([(X, 100u64)]).unwrap();
            let tx_id = owner.payout(&batch).await.unwrap();
            wait_for_receipt(&client(&url), hash(&tx_id)).await;

            let recipient = EvmPayoutAdapter::new(
                client(&url),
                LocalSigner::from_hex(X_KEY).unwrap(),
                owner.contract(),
            );
            let release = recipient.release().await.unwrap();
            wait_for_receipt(&client(&url), hash(&release)).await;

            let x: Address = X.parse().unwrap();
            let event = tokio::time::timeout(Duration::from_secs(10), subscription.next())
                .await
                .expect("event should arrive")
                .expect("stream still open")
                .unwrap();
            assert_eq!(event.to, x);
            assert_eq!(event.amount, U256::from(100u64));

            subscription.cancel().await;
            assert!(subscription.next().await.is_none());

            let history = owner.filter_payment_released(start, None).await.unwrap();
            assert_eq!(history.len(), 1);
            assert_eq!(history[0], event);
            assert_eq!(owner.balance_of(X).await.unwrap(), BigUint::from(0u64));
        });
    }

    #[test]
    #[ignore]
    fn test_reverts_are_decoded() {
        let (_anvil, url) = start_anvil();

        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let owner = deploy(&url).await;

            let stranger = EvmPayoutAdapter::new(
                client(&url),
                LocalSigner::from_hex(X_KEY).unwrap(),
                owner.contract(),
            );
            let batch = PayoutBatch::from_pairs([(Y, 1u64)]).unwrap();
            let err = stranger.payout(&batch).await.unwrap_err();
            assert!(matches!(err, EvmPayoutError::Reverted(PayoutRevert::NotOwner)));

            let err = stranger.release().await.unwrap_err();
            assert!(matches!(err, EvmPayoutError::Reverted(PayoutRevert::NoBalance)));
        });
    }

    // -----------------------------------------------------------------
    // Configuration wiring, no node needed
    // -----------------------------------------------------------------

    const CONFIG: &str = r#"
evm:
  rpc_url: http://127.0.0.1:8545
  private_key: "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80"
  contract: "0x5FbDB2315678afecb367f032d93F642f64180aa3"
neo:
  rpc_url: http://127.0.0.1:10332
  private_key: "L3tgppXLgdaeqSGSFw1Go3skBiy8vQAM7YMXvTHsKQtE16PBncSU"
  contract: "0x2b0b38e6fe7930875060b82d551d206efbebb26f"
"#;

    #[tokio::test]
    async fn test_adapters_connect_from_config() {
        let config = Config::from_yaml(CONFIG).unwrap();

        let evm = EvmPayoutAdapter::connect(config.evm.as_ref().unwrap()).unwrap();
        let neo = NeoPayoutAdapter::connect(config.neo.as_ref().unwrap()).unwrap();

        let adapters: Vec<Box<dyn PayoutAdapter>> = vec![Box::new(evm), Box::new(neo)];
        let payers: Vec<String> = adapters.iter().map(|a| a.payer()).collect();
        assert_eq!(
            payers,
            vec![
                "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266".to_string(),
                "NMACuhqEaNAeDSQVipcUPYiJ9TVgVyUxGV".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_mismatched_batch_never_reaches_either_chain() {
        let recipients = vec![X.to_string(), Y.to_string()];
        let err: PayoutError = PayoutBatch::new(recipients, vec![BigUint::from(1u8)])
            .unwrap_err()
            .into();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_missing_contracts_fail_at_construction() {
        let mut config = Config::from_yaml(CONFIG).unwrap();
        let mut evm = config.evm.take().unwrap();
        let mut neo = config.neo.take().unwrap();
        evm.contract = None;
        neo.contract = None;

        let err = EvmPayoutAdapter::connect(&evm).unwrap_err();
        assert!(matches!(
            err,
            EvmPayoutError::Validation(ValidationError::MissingConfig("evm.contract"))
        ));
        let err = NeoPayoutAdapter::connect(&neo).unwrap_err();
        assert!(matches!(
            err,
            NeoPayoutError::Validation(ValidationError::MissingConfig("neo.contract"))
        ));
    }

    #[tokio::test]
    async fn test_invalid_keys_fail_at_construction() {
        let yaml = CONFIG
            .replace("0xac0974be", "0xzz0974be")
            .replace("L3tgpp", "L3tgpq");
        let config = Config::from_yaml(&yaml).unwrap();

        let err: PayoutError = EvmPayoutAdapter::connect(config.evm.as_ref().unwrap())
            .unwrap_err()
            .into();
        assert_eq!(err.kind(), ErrorKind::Signing);
        let err: PayoutError = NeoPayoutAdapter::connect(config.neo.as_ref().unwrap())
            .unwrap_err()
            .into();
        assert_eq!(err.kind(), ErrorKind::Signing);
    }
}
