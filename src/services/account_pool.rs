use crate::{
    dal::{account_db::AccountRepository, StoreError},
    domain::account::{Account, AccountHandle, SenderMode},
};

pub struct AccountPool<R: AccountRepository> {
    accounts: Vec<Account>,
    default_quota: u32,
    repository: R,
}

impl<R: AccountRepository> AccountPool<R> {
    pub async fn load(repository: R, default_quota: u32) -> Self {
        let accounts = repository.load().await;
        AccountPool {
            accounts,
            default_quota,
            repository,
        }
    }

    pub fn select_sender(&self, mode: SenderMode) -> Option<AccountHandle> {
        self.accounts
            .iter()
            .enumerate()
            .find(|(_, account)| account.mode() == mode && account.has_capacity(self.default_quota))
            .map(|(index, account)| AccountHandle {
                index,
                email: account.email.clone(),
                password: account.password.clone(),
            })
    }

    pub async fn record_send(&mut self, handle: &AccountHandle) -> Result<(), StoreError> {
        let Some(account) = self.accounts.get_mut(handle.index) else {
            log::error!("Recorded a send for unknown account {}", handle.email);
            return Ok(());
        };
        account.sent += 1;

        self.repository.persist(&self.accounts).await
    }

    pub fn accounts(&self) -> &[Account] {
        &self.accounts
    }
}

#[cfg(test)]
mod tests {
    use super::AccountPool;
    use crate::{
        dal::account_db::MemoryAccountStore,
        domain::account::{Account, SenderMode},
    };

    fn account(email: &str, quota: u32, is_test: bool) -> Account {
        Account {
            email: email.to_string(),
            password: "secret".to_string(),
            sent: 0,
            is_test,
            quota: Some(quota),
        }
    }

    #[tokio::test]
    async fn first_fit_order_then_exhaustion() {
        let store = MemoryAccountStore::new(vec![account("a@x.com", 2, false), account("b@x.com", 1, false)]);
        let mut pool = AccountPool::load(store, 450).await;

        let mut order = vec![];
        for _ in 0..3 {
            let sender = pool.select_sender(SenderMode::Normal).unwrap();
            order.push(sender.email.clone());
            pool.record_send(&sender).await.unwrap();
        }

        assert_eq!(order, vec!["a@x.com", "a@x.com", "b@x.com"]);
        assert_eq!(pool.select_sender(SenderMode::Normal), None);
        assert_eq!(pool.repository.accounts()[0].sent, 2);
        assert_eq!(pool.repository.accounts()[1].sent, 1);
    }

    #[tokio::test]
    async fn probe_and_normal_accounts_are_disjoint() {
        let store = MemoryAccountStore::new(vec![account("probe@x.com", 5, true), account("a@x.com", 5, false)]);
        let pool = AccountPool::load(store, 450).await;

        assert_eq!(pool.select_sender(SenderMode::Normal).unwrap().email, "a@x.com");
        assert_eq!(pool.select_sender(SenderMode::Probe).unwrap().email, "probe@x.com");
    }

    #[tokio::test]
    async fn only_probe_accounts_means_no_normal_sender() {
        let store = MemoryAccountStore::new(vec![account("probe@x.com", 5, true)]);
        let pool = AccountPool::load(store, 450).await;

        assert_eq!(pool.select_sender(SenderMode::Normal), None);
    }

    #[tokio::test]
    async fn record_send_persists_counters() {
        let store = MemoryAccountStore::new(vec![account("a@x.com", 3, false)]);
        let mut pool = AccountPool::load(store, 450).await;

        let sender = pool.select_sender(SenderMode::Normal).unwrap();
        pool.record_send(&sender).await.unwrap();

        assert_eq!(pool.repository.accounts()[0].sent, 1);
        assert_eq!(pool.accounts()[0].sent, 1);
    }

    #[tokio::test]
    async fn default_quota_applies_without_override() {
        let mut plain = account("a@x.com", 0, false);
        plain.quota = None;
        plain.sent = 449;
        let store = MemoryAccountStore::new(vec![plain]);
        let mut pool = AccountPool::load(store, 450).await;

        let sender = pool.select_sender(SenderMode::Normal).unwrap();
        pool.record_send(&sender).await.unwrap();

        assert_eq!(pool.select_sender(SenderMode::Normal), None);
    }
}
