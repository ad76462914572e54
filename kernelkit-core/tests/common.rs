//! Common test utilities shared across integration tests.
#![allow(dead_code, missing_docs)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use alloy_primitives::{Address, Bytes, B256, U256};
use async_trait::async_trait;
use kernelkit_core::account::{
    AccountAuthenticator, AccountClient, AuthContext, AuthRequest, AuthenticatedAccount,
    BuiltSession, Call, SessionAccountBuilder, SessionBuildRequest,
};
use kernelkit_core::chain::{Chain, ChainConfig, ClientBuilder, Transport};
use kernelkit_core::session::SessionRecord;
use kernelkit_core::store::{AccountBinding, AccountHandle, ValidatorHandle};
use kernelkit_core::{EntryPointVersion, KernelKitResult};

pub fn chains() -> ChainConfig {
    ChainConfig::new(
        vec![Chain::new(1, "Ethereum"), Chain::new(137, "Polygon")],
        [(1, "project-1".to_string()), (137, "project-137".to_string())],
    )
    .unwrap()
}

/// Client builder that records how often it was asked to build.
#[derive(Default)]
pub struct CountingBuilder {
    pub builds: AtomicUsize,
}

impl CountingBuilder {
    pub fn builds(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct TestClient {
    pub chain_id: u64,
    pub url: String,
}

impl ClientBuilder for CountingBuilder {
    type Client = TestClient;

    fn build(&self, chain: &Chain, transport: &Transport) -> KernelKitResult<TestClient> {
        self.builds.fetch_add(1, Ordering::SeqCst);
        Ok(TestClient {
            chain_id: chain.id,
            url: transport.url().to_string(),
        })
    }
}

/// Account client that records nonce reads and submissions.
pub struct MockAccountClient {
    pub address: Address,
    pub entry_point: EntryPointVersion,
    pub session_key: Option<B256>,
    pub nonce_keys: Mutex<Vec<U256>>,
    pub submissions: Mutex<Vec<(Vec<Call>, Option<U256>)>>,
}

impl MockAccountClient {
    pub fn new(address: Address, entry_point: EntryPointVersion) -> Self {
        Self {
            address,
            entry_point,
            session_key: None,
            nonce_keys: Mutex::new(Vec::new()),
            submissions: Mutex::new(Vec::new()),
        }
    }

    pub fn submissions(&self) -> Vec<(Vec<Call>, Option<U256>)> {
        self.submissions.lock().unwrap().clone()
    }
}

#[async_trait]
impl AccountClient for MockAccountClient {
    fn address(&self) -> Address {
        self.address
    }

    fn entry_point(&self) -> EntryPointVersion {
        self.entry_point
    }

    async fn get_nonce(&self, key: U256) -> KernelKitResult<U256> {
        self.nonce_keys.lock().unwrap().push(key);
        Ok(key << 64)
    }

    async fn send_user_operation(
        &self,
        calls: Vec<Call>,
        nonce: Option<U256>,
    ) -> KernelKitResult<B256> {
        let mut submissions = self.submissions.lock().unwrap();
        submissions.push((calls, nonce));
        Ok(B256::with_last_byte(u8::try_from(submissions.len()).unwrap()))
    }

    async fn send_transactions(
        &self,
        calls: Vec<Call>,
        nonce: Option<U256>,
    ) -> KernelKitResult<B256> {
        self.send_user_operation(calls, nonce).await
    }
}

/// Authenticator returning the same account for every request.
pub struct ScriptedAuthenticator {
    pub address: Address,
    pub entry_point: EntryPointVersion,
    pub requests: Mutex<Vec<(AuthRequest, u64)>>,
    pub fail: bool,
}

impl ScriptedAuthenticator {
    pub fn new(address: Address, entry_point: EntryPointVersion) -> Self {
        Self {
            address,
            entry_point,
            requests: Mutex::new(Vec::new()),
            fail: false,
        }
    }

    pub fn failing(address: Address) -> Self {
        Self {
            fail: true,
            ..Self::new(address, EntryPointVersion::V07)
        }
    }

    pub fn requests(&self) -> Vec<(AuthRequest, u64)> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl AccountAuthenticator for ScriptedAuthenticator {
    async fn authenticate(
        &self,
        request: AuthRequest,
        context: &AuthContext,
    ) -> KernelKitResult<AuthenticatedAccount> {
        self.requests
            .lock()
            .unwrap()
            .push((request.clone(), context.chain.id));
        if self.fail {
            return Err(kernelkit_core::KernelKitError::Collaborator(
                "user rejected".to_string(),
            ));
        }
        Ok(AuthenticatedAccount {
            validator: ValidatorHandle {
                method: request.method(),
                data: Bytes::from_static(b"validator"),
            },
            account: AccountHandle {
                address: self.address,
            },
            entry_point: self.entry_point,
            client: Some(Arc::new(MockAccountClient::new(
                self.address,
                self.entry_point,
            ))),
        })
    }
}

/// Session builder handing out sequential tags and recording session clients.
pub struct MockSessionBuilder {
    pub next_tag: AtomicUsize,
    pub requests: Mutex<Vec<SessionBuildRequest>>,
    pub clients: Mutex<Vec<Arc<MockAccountClient>>>,
}

impl MockSessionBuilder {
    pub fn new() -> Self {
        Self {
            next_tag: AtomicUsize::new(1),
            requests: Mutex::new(Vec::new()),
            clients: Mutex::new(Vec::new()),
        }
    }

    pub fn last_client(&self) -> Arc<MockAccountClient> {
        Arc::clone(self.clients.lock().unwrap().last().unwrap())
    }
}

#[async_trait]
impl SessionAccountBuilder for MockSessionBuilder {
    async fn build(&self, request: SessionBuildRequest) -> KernelKitResult<BuiltSession> {
        let tag = self.next_tag.fetch_add(1, Ordering::SeqCst);
        let smart_account = request.sudo.account.address;
        self.requests.lock().unwrap().push(request);
        Ok(BuiltSession {
            session_tag: Bytes::from(vec![0xe0, u8::try_from(tag).unwrap()]),
            smart_account,
            enable_signature: Bytes::from_static(&[0x51, 0x91]),
        })
    }

    async fn session_client(
        &self,
        record: &SessionRecord,
        sudo: &AccountBinding,
        _context: &AuthContext,
    ) -> KernelKitResult<Arc<dyn AccountClient>> {
        let client = Arc::new(MockAccountClient {
            session_key: Some(record.session_key),
            ..MockAccountClient::new(record.smart_account, sudo.entry_point)
        });
        self.clients.lock().unwrap().push(Arc::clone(&client));
        Ok(client)
    }
}
