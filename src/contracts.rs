//! Relayer contract ABI definitions
//!
//! Uses alloy's sol! macro to generate type-safe bindings. Only the functions
//! this crate calls are declared.
//!
//! Getter return widths are declared as `uint256`; every uint is ABI-encoded
//! as a full word so narrower on-chain types decode unchanged. The `Update`
//! and `CoreConfig` structs must match DeliveryProviderStructs.sol exactly
//! because they take part in the `updateConfig` selector.

#![allow(clippy::too_many_arguments)]

use alloy::sol;

sol! {
    /// Delivery provider getters and the batched config update
    #[sol(rpc)]
    contract DeliveryProvider {
        struct Update {
            uint16 chainId;
            bool updateAssetConversionBuffer;
            bool updateDeliverGasOverhead;
            bool updatePrice;
            bool updateTargetChainAddress;
            bool updateMaximumBudget;
            bool updateSupportedChain;
            bool isSupported;
            uint16 buffer;
            uint16 bufferDenominator;
            uint256 newGasOverhead;
            uint256 newMaximumBudget;
            bytes32 targetChainAddress;
            uint128 gasPrice;
            uint128 nativeCurrencyPrice;
        }

        struct CoreConfig {
            bool updateWormholeRelayer;
            bool updateRewardAddress;
            bool updateSupportedKeyTypes;
            address wormholeRelayer;
            address rewardAddress;
            uint256 supportedKeyTypesBitmap;
        }

        function quoteGasPrice(uint16 targetChain) external view returns (uint256 price);

        function quoteAssetPrice(uint16 chainId) external view returns (uint256 price);

        function quoteDeliveryOverhead(uint16 targetChain) external view returns (uint256 overhead);

        function maximumBudget(uint16 targetChain) external view returns (uint256 budget);

        function assetConversionBuffer(uint16 targetChain) external view returns (uint16 tolerance, uint16 toleranceDenominator);

        function getTargetChainAddress(uint16 targetChain) external view returns (bytes32 deliveryProviderAddress);

        function isChainSupported(uint16 targetChain) external view returns (bool supported);

        function getRewardAddress() external view returns (address rewardAddress);

        function getSupportedKeys() external view returns (uint256 bitmap);

        function updateConfig(Update[] memory updates, CoreConfig memory coreConfig) external;
    }
}

sol! {
    /// Relayer entry point used for delivery quotes
    #[sol(rpc)]
    contract WormholeRelayer {
        function quoteEVMDeliveryPrice(uint16 targetChain, uint256 receiverValue, uint256 gasLimit)
            external view returns (uint256 nativePriceQuote, uint256 targetChainRefundPerGasUnused);
    }
}

sol! {
    /// Test integration that sends probe messages and records deliveries
    #[sol(rpc)]
    contract MockRelayerIntegration {
        function sendMessage(bytes memory message, uint16 targetChain, uint32 gasLimit, uint32 receiverValue)
            external payable;

        function getMessageHistory() external view returns (bytes[][] memory history);
    }
}
