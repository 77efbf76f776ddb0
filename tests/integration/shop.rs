//! A small order-processing rule base shared by the integration tests.
//!
//! `big-spender` derives a logical `vip` fact for every customer whose order
//! total reaches 100; `welcome-vip` sends a direct `email` to each vip.

use std::sync::Arc;

use thicket_engine::{
    Accumulate, AccumulateInput, CompareOp, Condition, JoinConstraint, Pattern, Rule, RuleBase,
    RuleBaseBuilder, Session, Sum,
};
use thicket_foundation::{Fact, FactHandle, KeywordId, Value};

#[derive(Clone)]
pub struct Shop {
    pub rule_base: Arc<RuleBase>,
    pub customer: KeywordId,
    pub order: KeywordId,
    pub vip: KeywordId,
    pub email: KeywordId,
    pub id: KeywordId,
    pub owner: KeywordId,
    pub amount: KeywordId,
    pub total: KeywordId,
}

impl Shop {
    pub fn new() -> Self {
        let mut builder = RuleBaseBuilder::new();
        let customer = builder.keyword("customer");
        let order = builder.keyword("order");
        let vip = builder.keyword("vip");
        let email = builder.keyword("email");
        let id = builder.keyword("id");
        let owner = builder.keyword("owner");
        let amount = builder.keyword("amount");
        let total = builder.keyword("total");

        builder.add_rule(
            Rule::new("big-spender")
                .when(Condition::Pattern(Pattern::new(customer).bind_field("cid", id)))
                .when(Condition::Accumulate(
                    Accumulate::new(
                        Pattern::new(order).join(JoinConstraint::equals(owner, "cid")),
                        Sum,
                        AccumulateInput::Field(amount),
                        "spent",
                    )
                    .with_test(CompareOp::Ge, 100),
                ))
                .then(move |ctx| {
                    let cid = ctx.get("cid").cloned().unwrap_or(Value::Nil);
                    let spent = ctx.get("spent").cloned().unwrap_or(Value::Nil);
                    ctx.insert_logical(Fact::new(vip).with(id, cid).with(total, spent))?;
                    Ok(())
                }),
        );
        builder.add_rule(
            Rule::new("welcome-vip")
                .when(Condition::Pattern(Pattern::new(vip).bind_field("cid", id)))
                .then(move |ctx| {
                    let cid = ctx.get("cid").cloned().unwrap_or(Value::Nil);
                    ctx.insert(Fact::new(email).with(id, cid))?;
                    Ok(())
                }),
        );

        Self {
            rule_base: builder.build().unwrap(),
            customer,
            order,
            vip,
            email,
            id,
            owner,
            amount,
            total,
        }
    }

    pub fn session(&self) -> Session {
        Session::new(Arc::clone(&self.rule_base)).unwrap()
    }

    pub fn add_customer(&self, session: &mut Session, cid: i64) -> FactHandle {
        session.insert(Fact::new(self.customer).with(self.id, cid)).unwrap()
    }

    pub fn add_order(&self, session: &mut Session, cid: i64, amount: i64) -> FactHandle {
        session
            .insert(Fact::new(self.order).with(self.owner, cid).with(self.amount, amount))
            .unwrap()
    }

    /// Customer ids of the current vip facts, sorted.
    pub fn vips(&self, session: &Session) -> Vec<i64> {
        let mut ids: Vec<i64> = session
            .facts_of_type(self.vip)
            .into_iter()
            .filter_map(|h| match session.fact(h).and_then(|f| f.get(self.id)) {
                Some(Value::Int(cid)) => Some(*cid),
                _ => None,
            })
            .collect();
        ids.sort();
        ids
    }
}
