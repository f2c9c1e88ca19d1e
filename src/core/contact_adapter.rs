//! Pure mapping between wallet-supplied contacts and the cart's address,
//! cost and delivery model.

use crate::domain::cart_ops::BuyerIdentityUpdate;
use crate::domain::model::{
    Cart, CartAddress, DeliveryOption, DeliverySelection, Money, ShippingMethod, SummaryLine,
    WalletContact, UNKNOWN_COUNTRY_CODE,
};
use crate::utils::error::{CheckoutError, Result};
use rust_decimal::Decimal;

/// Legacy or alias codes seen in wallet data, mapped to ISO 3166-1 alpha-2.
const COUNTRY_ALIASES: &[(&str, &str)] = &[
    ("UK", "GB"),
    ("JA", "JP"),
    ("EL", "GR"),
    ("FX", "FR"),
    ("TP", "TL"),
    ("ZR", "CD"),
];

/// US territories that carts model as country `US` with the territory as the
/// province.
pub const US_TERRITORIES: [&str; 5] = ["PR", "GU", "VI", "AS", "MP"];

pub const SHIPPING_LABEL: &str = "Shipping";
pub const TAX_LABEL: &str = "Tax";
pub const TOTAL_LABEL: &str = "Total";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountryResolution {
    pub country: String,
    /// Set when the input was a territory folded into its parent country.
    pub province: Option<String>,
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

pub fn map_to_country_code(input: Option<&str>) -> CountryResolution {
    let Some(trimmed) = input.map(str::trim).filter(|v| !v.is_empty()) else {
        return CountryResolution {
            country: UNKNOWN_COUNTRY_CODE.to_string(),
            province: None,
        };
    };

    if trimmed.chars().count() != 2 {
        return CountryResolution {
            country: trimmed.to_string(),
            province: None,
        };
    }

    let code = trimmed.to_uppercase();
    if US_TERRITORIES.contains(&code.as_str()) {
        return CountryResolution {
            country: "US".to_string(),
            province: Some(code),
        };
    }

    let country = COUNTRY_ALIASES
        .iter()
        .find(|(alias, _)| *alias == code)
        .map(|(_, iso)| iso.to_string())
        .unwrap_or(code);

    CountryResolution {
        country,
        province: None,
    }
}

pub fn contact_to_address(contact: &WalletContact) -> Result<CartAddress> {
    let postal = contact
        .postal_address
        .as_ref()
        .ok_or_else(|| CheckoutError::MissingFieldError {
            field: "postal_address".to_string(),
        })?;

    let first_name = non_empty(contact.given_name.as_deref());
    // A single-word name is used for both first and last name.
    let last_name = non_empty(contact.family_name.as_deref()).or_else(|| first_name.clone());

    let mut street_lines = postal
        .street
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty());
    let address1 = street_lines.next().map(str::to_string);
    let address2 = street_lines.next().map(str::to_string);

    let country_input = non_empty(Some(postal.iso_country_code.as_str()))
        .or_else(|| non_empty(Some(postal.country.as_str())));
    let resolution = map_to_country_code(country_input.as_deref());

    let province = resolution
        .province
        .or_else(|| non_empty(Some(postal.state.as_str())))
        .or_else(|| non_empty(Some(postal.sub_locality.as_str())));

    // Postal codes go through untouched; alphanumeric formats are valid.
    let zip = if postal.postal_code.is_empty() {
        None
    } else {
        Some(postal.postal_code.clone())
    };

    Ok(CartAddress {
        first_name,
        last_name,
        address1,
        address2,
        city: non_empty(Some(postal.city.as_str())),
        province,
        country: resolution.country,
        zip,
        phone: non_empty(contact.phone.as_deref()),
    })
}

pub fn buyer_identity_from_contact(contact: &WalletContact) -> BuyerIdentityUpdate {
    BuyerIdentityUpdate::new()
        .email(contact.email.clone().unwrap_or_default())
        .phone(contact.phone.clone().unwrap_or_default())
}

/// Every combination of one delivery option per group. With several groups
/// the amounts are summed and identifiers, labels and details concatenated.
pub fn create_shipping_methods(cart: &Cart) -> Vec<ShippingMethod> {
    if cart.delivery_groups.is_empty()
        || cart
            .delivery_groups
            .iter()
            .any(|group| group.delivery_options.is_empty())
    {
        return Vec::new();
    }

    let mut combinations: Vec<Vec<(&str, &DeliveryOption)>> = vec![Vec::new()];
    for group in &cart.delivery_groups {
        combinations = combinations
            .into_iter()
            .flat_map(|prefix| {
                group.delivery_options.iter().map(move |option| {
                    let mut next = prefix.clone();
                    next.push((group.id.as_str(), option));
                    next
                })
            })
            .collect();
    }

    combinations
        .into_iter()
        .map(|combination| {
            let currency = combination[0].1.estimated_cost.currency_code.clone();
            let amount: Decimal = combination
                .iter()
                .map(|(_, option)| option.estimated_cost.amount)
                .sum();

            ShippingMethod {
                identifier: join(&combination, ",", |option| option.handle.as_str()),
                label: join(&combination, ", ", |option| option.title.as_str()),
                detail: join(&combination, ", ", |option| {
                    option.description.as_deref().unwrap_or("")
                }),
                amount: Money::new(amount, currency),
                selections: combination
                    .iter()
                    .map(|(group_id, option)| DeliverySelection {
                        delivery_group_id: group_id.to_string(),
                        delivery_option_handle: option.handle.clone(),
                    })
                    .collect(),
            }
        })
        .collect()
}

fn join<'a, F>(
    combination: &[(&str, &'a DeliveryOption)],
    separator: &str,
    field: F,
) -> String
where
    F: Fn(&'a DeliveryOption) -> &'a str,
{
    combination
        .iter()
        .map(|(_, option)| field(*option))
        .filter(|value| !value.is_empty())
        .collect::<Vec<_>>()
        .join(separator)
}

/// The shipping method matching the options currently selected on the cart.
pub fn selected_shipping_method(cart: &Cart) -> Option<ShippingMethod> {
    let selected: Vec<DeliverySelection> = cart
        .delivery_groups
        .iter()
        .map(|group| {
            group
                .selected_delivery_option
                .as_ref()
                .map(|option| DeliverySelection {
                    delivery_group_id: group.id.clone(),
                    delivery_option_handle: option.handle.clone(),
                })
        })
        .collect::<Option<Vec<_>>>()?;

    create_shipping_methods(cart)
        .into_iter()
        .find(|method| method.selections == selected)
}

pub fn build_line_item_summary(
    cart: Option<&Cart>,
    selected_shipping_method: Option<&ShippingMethod>,
) -> Vec<SummaryLine> {
    let Some(cart) = cart else {
        return Vec::new();
    };

    let mut summary: Vec<SummaryLine> = cart
        .lines
        .iter()
        .map(|line| {
            let mut label = match &line.variant_title {
                Some(variant) => format!("{} - {}", line.title, variant),
                None => line.title.clone(),
            };
            if line.quantity > 1 {
                label.push_str(&format!(" x {}", line.quantity));
            }
            SummaryLine {
                label,
                amount: line.cost.clone(),
            }
        })
        .collect();

    let shipping = selected_shipping_method
        .map(|method| method.amount.clone())
        .or_else(|| selected_shipping_method_cost(cart));
    if let Some(amount) = shipping {
        summary.push(SummaryLine {
            label: SHIPPING_LABEL.to_string(),
            amount,
        });
    }

    if let Some(tax) = &cart.cost.total_tax_amount {
        summary.push(SummaryLine {
            label: TAX_LABEL.to_string(),
            amount: tax.clone(),
        });
    }

    summary.push(SummaryLine {
        label: TOTAL_LABEL.to_string(),
        amount: cart.cost.total_amount.clone(),
    });

    summary
}

fn selected_shipping_method_cost(cart: &Cart) -> Option<Money> {
    let options = cart
        .delivery_groups
        .iter()
        .map(|group| group.selected_delivery_option.as_ref())
        .collect::<Option<Vec<_>>>()?;
    let first = options.first()?;
    let amount = options.iter().map(|o| o.estimated_cost.amount).sum();
    Some(Money::new(amount, first.estimated_cost.currency_code.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::{
        BuyerIdentity, CartCost, CartLine, DeliveryGroup, DeliveryMethodType, PostalAddress,
    };
    use rust_decimal_macros::dec;
    use url::Url;

    fn contact(street: &str) -> WalletContact {
        WalletContact {
            given_name: Some("Ada".to_string()),
            family_name: Some("Lovelace".to_string()),
            email: Some("ada@example.com".to_string()),
            phone: Some("+15555550100".to_string()),
            postal_address: Some(PostalAddress {
                street: street.to_string(),
                city: "Ottawa".to_string(),
                state: "ON".to_string(),
                postal_code: "K1A 0B1".to_string(),
                country: "Canada".to_string(),
                iso_country_code: "ca".to_string(),
                ..Default::default()
            }),
        }
    }

    fn option(handle: &str, title: &str, amount: Decimal) -> DeliveryOption {
        DeliveryOption {
            handle: handle.to_string(),
            title: title.to_string(),
            code: None,
            delivery_method_type: DeliveryMethodType::Shipping,
            description: Some(format!("{title} delivery")),
            estimated_cost: Money::new(amount, "USD"),
        }
    }

    fn cart(groups: Vec<DeliveryGroup>) -> Cart {
        Cart {
            id: "cart-1".to_string(),
            checkout_url: Url::parse("https://shop.example.com/checkouts/1").unwrap(),
            lines: vec![CartLine {
                id: "line-1".to_string(),
                quantity: 2,
                merchandise_id: "variant-1".to_string(),
                title: "Mug".to_string(),
                variant_title: Some("Blue".to_string()),
                cost: Money::new(dec!(30.00), "USD"),
            }],
            cost: CartCost {
                subtotal_amount: Money::new(dec!(30.00), "USD"),
                total_amount: Money::new(dec!(43.00), "USD"),
                total_tax_amount: Some(Money::new(dec!(3.00), "USD")),
            },
            buyer_identity: BuyerIdentity::default(),
            delivery_groups: groups,
            delivery_addresses: Vec::new(),
        }
    }

    fn group(id: &str, options: Vec<DeliveryOption>, selected: Option<usize>) -> DeliveryGroup {
        DeliveryGroup {
            id: id.to_string(),
            selected_delivery_option: selected.map(|i| options[i].clone()),
            delivery_options: options,
        }
    }

    #[test]
    fn test_single_street_line() {
        let address = contact_to_address(&contact("1 Main St")).unwrap();
        assert_eq!(address.address1.as_deref(), Some("1 Main St"));
        assert_eq!(address.address2, None);
    }

    #[test]
    fn test_two_and_three_street_lines() {
        let two = contact_to_address(&contact("1 Main St\nSuite 4")).unwrap();
        assert_eq!(two.address1.as_deref(), Some("1 Main St"));
        assert_eq!(two.address2.as_deref(), Some("Suite 4"));

        let three = contact_to_address(&contact("1 Main St\nSuite 4\nBack door")).unwrap();
        assert_eq!(three.address1.as_deref(), Some("1 Main St"));
        assert_eq!(three.address2.as_deref(), Some("Suite 4"));
    }

    #[test]
    fn test_empty_street_yields_no_lines() {
        let address = contact_to_address(&contact("")).unwrap();
        assert_eq!(address.address1, None);
        assert_eq!(address.address2, None);
    }

    #[test]
    fn test_blank_first_line_is_skipped() {
        let address = contact_to_address(&contact("\n  \n1 Main St")).unwrap();
        assert_eq!(address.address1.as_deref(), Some("1 Main St"));
        assert_eq!(address.address2, None);
    }

    #[test]
    fn test_missing_postal_address_is_an_error() {
        let mut input = contact("1 Main St");
        input.postal_address = None;
        assert!(matches!(
            contact_to_address(&input),
            Err(CheckoutError::MissingFieldError { .. })
        ));
    }

    #[test]
    fn test_solo_name_fills_last_name() {
        let mut input = contact("1 Main St");
        input.family_name = Some(String::new());
        let address = contact_to_address(&input).unwrap();
        assert_eq!(address.first_name.as_deref(), Some("Ada"));
        assert_eq!(address.last_name.as_deref(), Some("Ada"));
    }

    #[test]
    fn test_country_and_postal_code_handling() {
        let address = contact_to_address(&contact("1 Main St")).unwrap();
        assert_eq!(address.country, "CA");
        assert_eq!(address.province.as_deref(), Some("ON"));
        assert_eq!(address.zip.as_deref(), Some("K1A 0B1"));
        assert_eq!(address.phone.as_deref(), Some("+15555550100"));
    }

    #[test]
    fn test_alphanumeric_postal_code_is_not_reformatted() {
        let mut input = contact("1 Main St");
        if let Some(postal) = input.postal_address.as_mut() {
            postal.postal_code = "A1A".to_string();
        }
        assert_eq!(contact_to_address(&input).unwrap().zip.as_deref(), Some("A1A"));
    }

    #[test]
    fn test_province_falls_back_to_sub_locality() {
        let mut input = contact("1 Main St");
        if let Some(postal) = input.postal_address.as_mut() {
            postal.state = String::new();
            postal.sub_locality = "Kanata".to_string();
        }
        assert_eq!(
            contact_to_address(&input).unwrap().province.as_deref(),
            Some("Kanata")
        );

        if let Some(postal) = input.postal_address.as_mut() {
            postal.sub_locality = String::new();
        }
        assert_eq!(contact_to_address(&input).unwrap().province, None);
    }

    #[test]
    fn test_missing_country_resolves_to_unknown() {
        let mut input = contact("1 Main St");
        if let Some(postal) = input.postal_address.as_mut() {
            postal.country = String::new();
            postal.iso_country_code = String::new();
        }
        assert_eq!(contact_to_address(&input).unwrap().country, UNKNOWN_COUNTRY_CODE);
    }

    #[test]
    fn test_map_to_country_code_tables() {
        assert_eq!(map_to_country_code(Some("uk")).country, "GB");
        assert_eq!(map_to_country_code(Some("JA")).country, "JP");
        assert_eq!(map_to_country_code(Some("de")).country, "DE");
        assert_eq!(map_to_country_code(Some("Deutschland")).country, "Deutschland");
        assert_eq!(map_to_country_code(None).country, UNKNOWN_COUNTRY_CODE);
        assert_eq!(map_to_country_code(Some("")).country, UNKNOWN_COUNTRY_CODE);
    }

    #[test]
    fn test_map_to_country_code_is_idempotent() {
        for input in ["uk", "GB", "pr", "fr", "Narnia", ""] {
            assert_eq!(
                map_to_country_code(Some(input)),
                map_to_country_code(Some(input))
            );
        }
    }

    #[test]
    fn test_us_territories_keep_their_code_as_province() {
        for territory in US_TERRITORIES {
            let resolution = map_to_country_code(Some(territory));
            assert_eq!(resolution.country, "US");
            assert_eq!(resolution.province.as_deref(), Some(territory));
        }
    }

    #[test]
    fn test_single_group_shipping_methods() {
        let cart = cart(vec![group(
            "group-1",
            vec![
                option("standard", "Standard", dec!(10.00)),
                option("express", "Express", dec!(20.99)),
            ],
            None,
        )]);

        let methods = create_shipping_methods(&cart);
        assert_eq!(methods.len(), 2);
        assert_eq!(methods[0].identifier, "standard");
        assert_eq!(methods[0].label, "Standard");
        assert_eq!(methods[0].amount.amount, dec!(10.00));
        assert_eq!(methods[1].identifier, "express");
        assert_eq!(methods[1].label, "Express");
        assert_eq!(methods[1].amount.amount, dec!(20.99));
    }

    #[test]
    fn test_multi_group_shipping_methods_are_combined() {
        let cart = cart(vec![
            group(
                "group-1",
                vec![
                    option("standard", "Standard", dec!(10.00)),
                    option("express", "Express", dec!(20.99)),
                ],
                None,
            ),
            group("group-2", vec![option("freight", "Freight", dec!(5.01))], None),
        ]);

        let methods = create_shipping_methods(&cart);
        assert_eq!(methods.len(), 2);
        assert_eq!(methods[0].identifier, "standard,freight");
        assert_eq!(methods[0].label, "Standard, Freight");
        assert_eq!(methods[0].detail, "Standard delivery, Freight delivery");
        assert_eq!(methods[0].amount.amount, dec!(15.01));
        assert_eq!(methods[1].identifier, "express,freight");
        assert_eq!(methods[1].amount.amount, dec!(26.00));
        assert_eq!(methods[1].selections.len(), 2);
        assert_eq!(methods[1].selections[1].delivery_group_id, "group-2");
    }

    #[test]
    fn test_line_item_summary() {
        assert!(build_line_item_summary(None, None).is_empty());

        let cart = cart(vec![group(
            "group-1",
            vec![option("standard", "Standard", dec!(10.00))],
            Some(0),
        )]);
        let summary = build_line_item_summary(Some(&cart), None);

        let labels: Vec<&str> = summary.iter().map(|l| l.label.as_str()).collect();
        assert_eq!(labels, vec!["Mug - Blue x 2", "Shipping", "Tax", "Total"]);
        assert_eq!(summary[1].amount.amount, dec!(10.00));
        assert_eq!(summary[3].amount.amount, dec!(43.00));

        let express = ShippingMethod {
            identifier: "express".to_string(),
            label: "Express".to_string(),
            detail: String::new(),
            amount: Money::new(dec!(20.99), "USD"),
            selections: Vec::new(),
        };
        let summary = build_line_item_summary(Some(&cart), Some(&express));
        assert_eq!(summary[1].amount.amount, dec!(20.99));
    }

    #[test]
    fn test_selected_shipping_method() {
        let cart = cart(vec![group(
            "group-1",
            vec![
                option("standard", "Standard", dec!(10.00)),
                option("express", "Express", dec!(20.99)),
            ],
            Some(1),
        )]);
        assert_eq!(
            selected_shipping_method(&cart).map(|m| m.identifier),
            Some("express".to_string())
        );
    }

    #[test]
    fn test_buyer_identity_from_contact_skips_empty_fields() {
        let mut input = contact("1 Main St");
        input.phone = Some(String::new());
        let update = buyer_identity_from_contact(&input);
        assert_eq!(update.email_value(), Some("ada@example.com"));
        assert_eq!(update.phone_value(), None);
    }
}
