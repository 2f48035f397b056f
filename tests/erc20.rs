use erc20_ledger::{
    config::DevnetConfig,
    harness::{assert_emitted, change_balance, change_balances, expect_revert_with},
    units::parse_ether,
    Address, Amount, Devnet, TokenCall, TokenEvent, TokenMetadata, TxRequest,
};

struct Setup {
    devnet: Devnet,
    token: Address,
    deployer: Address,
    user: Address,
    total: Amount,
}

fn setup() -> Setup {
    let mut devnet = Devnet::new(&DevnetConfig::default()).unwrap();
    let deployer = devnet.signer(0).unwrap();
    let user = devnet.signer(1).unwrap();
    let total = parse_ether("10").unwrap();
    let token = devnet
        .deploy_token(&deployer, TokenMetadata::default(), total, None)
        .unwrap()
        .contract_address
        .unwrap();
    Setup {
        devnet,
        token,
        deployer,
        user,
        total,
    }
}

fn send_200(from: Address, to: Address) -> TxRequest {
    TxRequest {
        from,
        to,
        value: 200,
        gas_price: Some(0),
    }
}

#[test]
fn assigns_initial_balance() {
    let s = setup();
    let token = s.devnet.token(&s.token).unwrap();
    assert_eq!(token.balance_of(&s.deployer), s.total);
    assert_eq!(token.balance_of(&s.user), 0);
    assert_eq!(token.total_supply(), s.total);
}

#[test]
fn transfer_emits_event() {
    let mut s = setup();
    let receipt = s
        .devnet
        .token_transfer(&s.deployer, &s.token, &s.user, 7)
        .unwrap();
    assert_emitted(
        &receipt,
        &TokenEvent::Transfer {
            from: s.deployer,
            to: s.user,
            value: 7,
        },
    )
    .unwrap();
    assert_eq!(receipt.logs.len(), 1);
    let token = s.devnet.token(&s.token).unwrap();
    assert_eq!(token.balance_of(&s.deployer), s.total - 7);
    assert_eq!(token.balance_of(&s.user), 7);
}

#[test]
fn can_not_transfer_above_the_amount() {
    let mut s = setup();
    let result = s
        .devnet
        .token_transfer(&s.deployer, &s.token, &s.deployer, s.total + 1);
    expect_revert_with(result, "ERC20: transfer amount exceeds balance").unwrap();
    assert_eq!(
        s.devnet.token(&s.token).unwrap().balance_of(&s.deployer),
        s.total
    );
}

#[test]
fn send_transaction_changes_receiver_balance() {
    let mut s = setup();
    let tx = send_200(s.deployer, s.user);
    let (_, delta) = change_balance(&mut s.devnet, &s.user, |net| net.send_transaction(tx)).unwrap();
    assert_eq!(delta, 200);
}

#[test]
fn send_transaction_changes_sender_and_receiver_balances() {
    let mut s = setup();
    let tx = send_200(s.deployer, s.user);
    let (_, deltas) = change_balances(&mut s.devnet, &[s.deployer, s.user], |net| {
        net.send_transaction(tx)
    })
    .unwrap();
    assert_eq!(deltas, vec![-200, 200]);
}

#[test]
fn self_transfer_keeps_balance_and_logs() {
    let mut s = setup();
    let receipt = s
        .devnet
        .token_transfer(&s.deployer, &s.token, &s.deployer, 5)
        .unwrap();
    assert_eq!(
        receipt.logs,
        vec![TokenEvent::Transfer {
            from: s.deployer,
            to: s.deployer,
            value: 5
        }]
    );
    assert_eq!(
        s.devnet.token(&s.token).unwrap().balance_of(&s.deployer),
        s.total
    );
}

#[test]
fn delegated_spend_through_the_devnet() {
    let mut s = setup();
    let receiver = s.devnet.signer(2).unwrap();
    let approve = s
        .devnet
        .call_token(
            &s.deployer,
            &s.token,
            &TokenCall::Approve {
                spender: s.user,
                amount: 50,
            },
            None,
        )
        .unwrap();
    assert_emitted(
        &approve,
        &TokenEvent::Approval {
            owner: s.deployer,
            spender: s.user,
            value: 50,
        },
    )
    .unwrap();

    let spend = TokenCall::TransferFrom {
        from: s.deployer,
        to: receiver,
        amount: 30,
    };
    s.devnet.call_token(&s.user, &s.token, &spend, None).unwrap();
    expect_revert_with(
        s.devnet.call_token(&s.user, &s.token, &spend, None),
        "ERC20: transfer amount exceeds allowance",
    )
    .unwrap();

    let token = s.devnet.token(&s.token).unwrap();
    assert_eq!(token.balance_of(&receiver), 30);
    assert_eq!(token.allowance(&s.deployer, &s.user), 20);
    assert_eq!(token.circulating(), token.total_supply());
}

#[test]
fn token_calls_pay_fees_at_default_gas_price() {
    let mut s = setup();
    let (receipt, delta) = change_balance(&mut s.devnet, &s.deployer, |net| {
        net.token_transfer(&s.deployer, &s.token, &s.user, 1)
    })
    .unwrap();
    assert!(receipt.fee > 0);
    assert_eq!(delta, -(receipt.fee as i128));
}
