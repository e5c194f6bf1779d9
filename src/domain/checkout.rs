use std::collections::BTreeMap;

use uuid::Uuid;

use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct ProductSnapshot {
    pub id: Uuid,
    pub name: String,
    pub sku: String,
    pub base_price: i64,
    pub stock: i32,
    pub is_active: bool,
}

#[derive(Debug, Clone)]
pub struct VariantSnapshot {
    pub id: Uuid,
    pub product_id: Uuid,
    pub name: String,
    pub sku: String,
    pub price_adjustment: i64,
    pub stock: i32,
    pub is_active: bool,
}

#[derive(Debug, Clone)]
pub struct CandidateLine {
    pub product: ProductSnapshot,
    pub variant: Option<VariantSnapshot>,
    pub quantity: i32,
}

/// A validated line, frozen into an order item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PricedLine {
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
    pub product_name: String,
    pub variant_name: Option<String>,
    pub sku: String,
    pub unit_price: i64,
    pub quantity: i32,
    pub line_total: i64,
}

/// Quantities to take from (or give back to) product and variant stock.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StockDemand {
    pub products: BTreeMap<Uuid, i32>,
    pub variants: BTreeMap<Uuid, i32>,
}

impl StockDemand {
    pub fn add(&mut self, product_id: Option<Uuid>, variant_id: Option<Uuid>, quantity: i32) {
        if let Some(id) = product_id {
            *self.products.entry(id).or_default() += quantity;
        }
        if let Some(id) = variant_id {
            *self.variants.entry(id).or_default() += quantity;
        }
    }
}

pub fn unit_price(base_price: i64, adjustment: i64) -> Result<i64, AppError> {
    base_price
        .checked_add(adjustment)
        .filter(|price| *price > 0)
        .ok_or_else(|| {
            AppError::BadRequest("variant adjustment makes the price non-positive".into())
        })
}

/// A new base price must keep every existing variant priced above zero.
pub fn ensure_variant_prices(base_price: i64, adjustments: &[i64]) -> Result<(), AppError> {
    match adjustments.iter().min() {
        Some(&lowest) if unit_price(base_price, lowest).is_err() => Err(AppError::BadRequest(
            format!("price {base_price} leaves a variant at or below zero (adjustment {lowest})"),
        )),
        _ => Ok(()),
    }
}

/// Validates every line (active, positive quantity, variant ownership, stock
/// summed across lines of the same product) and prices it.
pub fn price_lines(lines: &[CandidateLine]) -> Result<Vec<PricedLine>, AppError> {
    let mut demand = StockDemand::default();
    let mut priced = Vec::with_capacity(lines.len());

    for line in lines {
        let product = &line.product;
        if line.quantity <= 0 {
            return Err(AppError::BadRequest("Cart has invalid quantity".into()));
        }
        if !product.is_active {
            return Err(AppError::BadRequest(format!(
                "Product {} is no longer available",
                product.name
            )));
        }

        let (adjustment, variant_name, sku) = match &line.variant {
            Some(variant) => {
                if variant.product_id != product.id {
                    return Err(AppError::BadRequest(format!(
                        "Variant {} does not belong to {}",
                        variant.name, product.name
                    )));
                }
                if !variant.is_active {
                    return Err(AppError::BadRequest(format!(
                        "{} ({}) is no longer available",
                        product.name, variant.name
                    )));
                }
                (
                    variant.price_adjustment,
                    Some(variant.name.clone()),
                    variant.sku.clone(),
                )
            }
            None => (0, None, product.sku.clone()),
        };

        demand.add(
            Some(product.id),
            line.variant.as_ref().map(|v| v.id),
            line.quantity,
        );

        let unit_price = unit_price(product.base_price, adjustment)?;
        priced.push(PricedLine {
            product_id: product.id,
            variant_id: line.variant.as_ref().map(|v| v.id),
            product_name: product.name.clone(),
            variant_name,
            sku,
            unit_price,
            quantity: line.quantity,
            line_total: unit_price * i64::from(line.quantity),
        });
    }

    for line in lines {
        let wanted = demand.products.get(&line.product.id).copied().unwrap_or(0);
        if wanted > line.product.stock {
            return Err(AppError::InsufficientStock(line.product.name.clone()));
        }
        if let Some(variant) = &line.variant {
            let wanted = demand.variants.get(&variant.id).copied().unwrap_or(0);
            if wanted > variant.stock {
                return Err(AppError::InsufficientStock(format!(
                    "{} ({})",
                    line.product.name, variant.name
                )));
            }
        }
    }

    Ok(priced)
}

pub fn subtotal(lines: &[PricedLine]) -> i64 {
    lines.iter().map(|l| l.line_total).sum()
}

pub fn demand_of(lines: &[PricedLine]) -> StockDemand {
    let mut demand = StockDemand::default();
    for line in lines {
        demand.add(Some(line.product_id), line.variant_id, line.quantity);
    }
    demand
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product(stock: i32) -> ProductSnapshot {
        ProductSnapshot {
            id: Uuid::new_v4(),
            name: "Robusta Dak Lak".into(),
            sku: "RB-DL".into(),
            base_price: 150_000,
            stock,
            is_active: true,
        }
    }

    fn variant(product: &ProductSnapshot, adjustment: i64, stock: i32) -> VariantSnapshot {
        VariantSnapshot {
            id: Uuid::new_v4(),
            product_id: product.id,
            name: "500g".into(),
            sku: "RB-DL-500".into(),
            price_adjustment: adjustment,
            stock,
            is_active: true,
        }
    }

    #[test]
    fn prices_with_variant_adjustment() {
        let p = product(10);
        let v = variant(&p, 120_000, 5);
        let lines = price_lines(&[
            CandidateLine {
                product: p.clone(),
                variant: Some(v.clone()),
                quantity: 2,
            },
            CandidateLine {
                product: p.clone(),
                variant: None,
                quantity: 1,
            },
        ])
        .unwrap();

        assert_eq!(lines[0].unit_price, 270_000);
        assert_eq!(lines[0].line_total, 540_000);
        assert_eq!(lines[0].sku, "RB-DL-500");
        assert_eq!(lines[1].unit_price, 150_000);
        assert_eq!(subtotal(&lines), 690_000);

        let demand = demand_of(&lines);
        assert_eq!(demand.products[&p.id], 3);
        assert_eq!(demand.variants[&v.id], 2);
    }

    #[test]
    fn stock_is_summed_across_lines() {
        let p = product(3);
        let v = variant(&p, 0, 10);
        let err = price_lines(&[
            CandidateLine {
                product: p.clone(),
                variant: Some(v),
                quantity: 2,
            },
            CandidateLine {
                product: p,
                variant: None,
                quantity: 2,
            },
        ])
        .unwrap_err();
        assert!(matches!(err, AppError::InsufficientStock(_)));
    }

    #[test]
    fn variant_stock_checked() {
        let p = product(100);
        let v = variant(&p, 0, 1);
        let err = price_lines(&[CandidateLine {
            product: p,
            variant: Some(v),
            quantity: 2,
        }])
        .unwrap_err();
        assert!(matches!(err, AppError::InsufficientStock(name) if name.contains("500g")));
    }

    #[test]
    fn inactive_and_foreign_variants_rejected() {
        let mut p = product(10);
        p.is_active = false;
        assert!(
            price_lines(&[CandidateLine {
                product: p.clone(),
                variant: None,
                quantity: 1
            }])
            .is_err()
        );

        let p = product(10);
        let other = product(10);
        let foreign = variant(&other, 0, 10);
        assert!(
            price_lines(&[CandidateLine {
                product: p,
                variant: Some(foreign),
                quantity: 1
            }])
            .is_err()
        );
    }

    #[test]
    fn non_positive_price_rejected() {
        assert!(unit_price(100_000, -100_000).is_err());
        assert_eq!(unit_price(100_000, -20_000).unwrap(), 80_000);
        assert!(unit_price(i64::MAX, 1).is_err());
    }

    #[test]
    fn lowering_base_price_checks_every_variant() {
        assert!(ensure_variant_prices(40_000, &[]).is_ok());
        assert!(ensure_variant_prices(40_000, &[20_000, -30_000]).is_ok());
        assert!(matches!(
            ensure_variant_prices(40_000, &[20_000, -50_000]),
            Err(AppError::BadRequest(_))
        ));
        assert!(ensure_variant_prices(50_000, &[-50_000]).is_err());
    }
}
